//! SMTP probing: sessions, pooling, and the single-check probe.

pub mod pool;
pub mod probe;
pub mod result;
pub mod session;

pub use pool::{ConnectionPool, PooledSession};
pub use probe::SmtpProbe;
pub use result::{IndeterminateReason, ProbeOutcome};
pub use session::{
    LettreConnector, LettreSession, MailSession, RecipientReply, SessionConnector, SmtpReply,
};

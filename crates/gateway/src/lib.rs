// Rollcall Gateway - telemetry ingestion from scanning agents
//
// Accepts one long-lived TCP session per agent, hands it the roster ids and
// feeds its sightings into the presence store.

pub mod codec;
pub mod protocol;
pub mod server;
pub mod session;

pub use codec::{AgentLine, AgentLineCodec};
pub use protocol::{parse_telemetry, ProtocolError, Telemetry, MAX_LINE_LEN};
pub use server::IngestServer;
pub use session::{AgentSession, SessionRegistry};

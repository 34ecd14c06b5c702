pub mod dispatch;
pub mod protocol;
pub mod retained;
pub mod session;
pub mod will;

pub use dispatch::{DispatchFailure, MsgDispatcher, PublishMsgProto, QueueMsgDispatcher};
pub use protocol::{PublishMsg, PublishProperties, Qos};
pub use retained::{MemoryRetainedProcessor, NoopRetained, RetainedMsgProcessor};
pub use session::{ClientInfo, ClientType, ConnectionInfo, DisconnectReason, SessionInfo};
pub use will::{LastWillService, MsgWithSessionInfo, WillDecision};

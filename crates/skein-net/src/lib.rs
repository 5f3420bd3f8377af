// Envelope transport for the thread engine: the send port, frame codec and
// an in-process switchboard that routes frames between registered peers.

pub mod error;
pub mod messages;
pub mod peers;
pub mod sender;
pub mod switchboard;

pub use error::NetError;
pub use messages::{decode_frame, encode_frame};
pub use peers::{PeerTracker, RouteStats};
pub use sender::MessageSender;
pub use switchboard::{Delivery, PeerLink, Switchboard, SwitchboardCommand};

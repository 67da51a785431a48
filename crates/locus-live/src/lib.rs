//! Live tracking for Locus
//!
//! Connects a position source, a real-time transport, a weather lookup and a
//! map renderer around the geo-fence tracker.

pub mod hub;
pub mod map;
pub mod position;
pub mod session;
pub mod subscription;
pub mod transport;
pub mod weather;

pub use hub::{HubConnection, LocalHub};
pub use map::{MapRenderer, MapView, MarkerLayer, FENCE_CENTER_LABEL};
pub use position::{ManualSource, PositionSource, PositionUpdate, ReplaySource, WatchOptions};
pub use session::{LiveSession, SessionEvent};
pub use subscription::{subscription, Feed, Subscription};
pub use transport::{ClientMessage, RemoteEvent, ServerMessage, TransportChannel};
pub use weather::WeatherLookup;

//! Relay pipeline.
//!
//! Every inbound item flows through:
//! 1. `AlbumAggregator::admit()` — standalone, new album, or folded into an open album
//! 2. `AlbumAggregator::settle()` — album opener waits out the window, gets all members
//! 3. `router::route()` — text / single media / album / skip
//! 4. `DeliveryPipeline::deliver()` — template applied, sent to the destination
//!
//! `/pattern` commands bypass this and go to the template update handler.

pub mod aggregator;
pub mod delivery;
pub mod dispatcher;
pub mod router;
pub mod types;

pub use aggregator::{Admission, AlbumAggregator, GroupTicket};
pub use delivery::{Delivery, DeliveryPipeline};
pub use dispatcher::{Outcome, Relay};
pub use router::Route;
pub use types::{DeliveryUnit, Group, InboundItem, PayloadKind};

pub mod entity;
pub mod event;
pub mod market;

pub use entity::{ classify_address, IconRefs, TrackedEntity };
pub use event::TriggerEvent;
pub use market::{ format_price, AddressActivity, Auxiliary, NormalizedResult, Transaction };

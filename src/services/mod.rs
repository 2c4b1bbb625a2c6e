pub mod broadcast;
pub mod content;
pub mod delivery_tracker;
pub mod eligibility;
pub mod enhanced_broadcast;
pub mod health;
pub mod reminder;
pub mod sequence;
pub mod transport;

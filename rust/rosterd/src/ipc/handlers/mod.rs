pub mod backup;
pub mod core;
pub mod exam_bank;
pub mod roster;
pub mod session;
pub mod setup;

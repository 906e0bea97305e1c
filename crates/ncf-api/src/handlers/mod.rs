pub mod explain;
pub mod health;
pub mod predict;
pub mod rank;

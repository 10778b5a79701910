pub mod assessor;
pub mod catalog;
pub mod comments;
pub mod core;
pub mod maintenance;
pub mod marks;
pub mod review;
pub mod stats;
pub mod submissions;

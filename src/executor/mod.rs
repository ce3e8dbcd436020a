pub mod action;
pub mod coordinator;
pub mod dispatcher;
pub mod input;
pub mod system;

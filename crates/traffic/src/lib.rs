pub mod condition;
pub mod dispatcher;
pub mod observer;
pub mod reporter;
pub mod robot;
pub mod simulation;
pub mod source;
pub mod stations;

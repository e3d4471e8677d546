pub mod dispatch;
pub mod staticinfrastructure;

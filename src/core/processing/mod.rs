pub mod composite;
pub mod normalize;
pub mod pipeline;
pub mod resize;
pub mod save;

pub mod application;
pub mod camera;
pub mod cli;
pub mod loader;
pub mod material;
pub mod renderer;
pub mod resource;
pub mod scene;
pub mod surface;
pub mod texture;
pub mod view;

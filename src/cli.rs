use clap::Parser;
use winit::{dpi::LogicalSize, window::WindowBuilder};

use crate::{
    loader::TextureSource,
    view::{ViewConfig, DEFAULT_COLOR_MAP, DEFAULT_REFLECTANCE_MAP},
};

#[derive(Parser, Debug, Clone)]
#[command(name = "earthlight")]
#[command(about = "Sunlit and moonlit Earth, side by side", long_about = None)]
pub struct Cli {
    /// Color map of the Earth surface (URL or file path)
    #[arg(long, value_name = "URL|PATH", default_value = DEFAULT_COLOR_MAP)]
    pub color_map: TextureSource,

    /// Reflectance map, bright where the surface is shiny (URL or file path)
    #[arg(long, value_name = "URL|PATH", default_value = DEFAULT_REFLECTANCE_MAP)]
    pub reflectance_map: TextureSource,

    /// Initial window width
    #[arg(long, default_value_t = 1600)]
    pub width: u32,

    /// Initial window height
    #[arg(long, default_value_t = 800)]
    pub height: u32,

    /// Orbit damping factor, between 0 and 1
    #[arg(long, default_value_t = 0.05, value_parser = parse_damping)]
    pub damping: f32,
}

fn parse_damping(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|err| format!("{err}"))?;
    if !value.is_finite() {
        return Err(format!("`{s}` is not a finite number"));
    }
    Ok(value)
}

impl Cli {
    pub fn view_config(&self) -> ViewConfig {
        ViewConfig {
            color_map: self.color_map.clone(),
            reflectance_map: self.reflectance_map.clone(),
            damping: self.damping.clamp(0.0, 1.0),
        }
    }

    pub fn window_builder(&self) -> WindowBuilder {
        WindowBuilder::new()
            .with_title("earthlight")
            .with_inner_size(LogicalSize::new(self.width.max(1), self.height.max(1)))
    }
}

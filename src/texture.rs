use image::{imageops::FilterType, RgbaImage};

use crate::resource::Release;

pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    width: u32,
    height: u32,
    mip_level_count: u32,
}

impl Texture {
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Upload an RGBA image as a sampled texture with a full mip chain.
    /// The image must fit within the device's 2D texture limit.
    pub fn from_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        img: &RgbaImage,
        format: wgpu::TextureFormat,
        label: Option<&str>,
    ) -> Self {
        let (width, height) = img.dimensions();
        let mip_level_count = mip_level_count(width, height);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size: extent(width, height),
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let texture = Self::with_default_view(device, texture, width, height, mip_level_count);
        texture.write_mip_chain(queue, img);
        texture
    }

    /// 1x1 texture of a single color, used until a real map is available.
    pub fn solid(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        color: [u8; 4],
        format: wgpu::TextureFormat,
        label: Option<&str>,
    ) -> Self {
        let img = RgbaImage::from_pixel(1, 1, image::Rgba(color));
        Self::from_image(device, queue, &img, format, label)
    }

    /// Color target that is rendered into and then sampled.
    pub fn render_target(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        label: Option<&str>,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        Self::with_default_view(device, texture, width, height, 1)
    }

    pub fn depth(device: &wgpu::Device, width: u32, height: u32, label: Option<&str>) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        Self::with_default_view(device, texture, width, height, 1)
    }

    fn with_default_view(
        device: &wgpu::Device,
        texture: wgpu::Texture,
        width: u32,
        height: u32,
        mip_level_count: u32,
    ) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
            width,
            height,
            mip_level_count,
        }
    }

    /// Write `img` into level 0 and a downscaled copy into every level below.
    fn write_mip_chain(&self, queue: &wgpu::Queue, img: &RgbaImage) {
        self.write_level(queue, 0, img);

        let mut previous: Option<RgbaImage> = None;
        for level in 1..self.mip_level_count {
            let source = previous.as_ref().unwrap_or(img);
            let (width, height) = mip_size(self.width, self.height, level);
            let next = image::imageops::resize(source, width, height, FilterType::Triangle);
            self.write_level(queue, level, &next);
            previous = Some(next);
        }
    }

    fn write_level(&self, queue: &wgpu::Queue, level: u32, img: &RgbaImage) {
        let (width, height) = img.dimensions();
        debug_assert_eq!((width, height), mip_size(self.width, self.height, level));
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            img.as_raw(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            extent(width, height),
        );
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn mip_level_count(&self) -> u32 {
        self.mip_level_count
    }
}

impl Release for Texture {
    fn release(&mut self) {
        self.texture.destroy();
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: width.max(1),
        height: height.max(1),
        depth_or_array_layers: 1,
    }
}

/// Levels from full size down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    u32::BITS - width.max(height).max(1).leading_zeros()
}

fn mip_size(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

/// Largest size with the same aspect ratio whose sides are at most
/// `max_dimension`. Sizes already within the limit are returned unchanged.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension {
        return (width, height);
    }
    let scale = max_dimension as f64 / longest as f64;
    let fit = |side: u32| ((side as f64 * scale).round() as u32).clamp(1, max_dimension);
    (fit(width), fit(height))
}

/// Material map that starts as a placeholder and is replaced once its image
/// has been fetched. Shared by every material that samples it.
pub struct TextureMap {
    texture: Texture,
    format: wgpu::TextureFormat,
    label: &'static str,
}

impl TextureMap {
    pub fn placeholder(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        color: [u8; 4],
        format: wgpu::TextureFormat,
        label: &'static str,
    ) -> Self {
        Self {
            texture: Texture::solid(device, queue, color, format, Some(label)),
            format,
            label,
        }
    }

    /// Swap the placeholder (or a previous image) for `img`, scaled down to the
    /// device's texture limit when it is larger.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, img: &RgbaImage) {
        let max_dimension = device.limits().max_texture_dimension_2d;
        let (width, height) = img.dimensions();
        let (fit_width, fit_height) = fit_within(width, height, max_dimension);

        let texture = if (fit_width, fit_height) == (width, height) {
            Texture::from_image(device, queue, img, self.format, Some(self.label))
        } else {
            tracing::warn!(
                label = self.label,
                width,
                height,
                max_dimension,
                "map exceeds the device texture limit, scaling down"
            );
            let scaled = image::imageops::resize(img, fit_width, fit_height, FilterType::Triangle);
            Texture::from_image(device, queue, &scaled, self.format, Some(self.label))
        };

        let mut previous = std::mem::replace(&mut self.texture, texture);
        previous.release();
        tracing::info!(
            label = self.label,
            width = fit_width,
            height = fit_height,
            mips = self.texture.mip_level_count(),
            "texture uploaded"
        );
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }
}

impl Release for TextureMap {
    fn release(&mut self) {
        self.texture.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headless_device() -> Option<(wgpu::Device, wgpu::Queue)> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    force_fallback_adapter: false,
                    compatible_surface: None,
                })
                .await?;
            adapter
                .request_device(
                    &wgpu::DeviceDescriptor {
                        label: None,
                        features: wgpu::Features::empty(),
                        limits: wgpu::Limits::default(),
                    },
                    None,
                )
                .await
                .ok()
        })
    }

    #[test]
    fn mip_chain_reaches_one_texel() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2048, 1024), 12);
        assert_eq!(mip_level_count(3, 5), 3);
        assert_eq!(mip_size(2048, 1024, 11), (1, 1));
        assert_eq!(mip_size(2048, 1024, 10), (2, 1));
    }

    #[test]
    fn fit_within_keeps_small_images() {
        assert_eq!(fit_within(2048, 1024, 8192), (2048, 1024));
        assert_eq!(fit_within(8192, 8192, 8192), (8192, 8192));
    }

    #[test]
    fn fit_within_scales_the_longest_side_to_the_limit() {
        assert_eq!(fit_within(16384, 8192, 8192), (8192, 4096));
        assert_eq!(fit_within(8193, 1, 8192), (8192, 1));
        assert_eq!(fit_within(100, 40000, 8192), (20, 8192));
    }

    #[test]
    fn oversized_map_is_scaled_to_device_limit() {
        let Some((device, queue)) = headless_device() else {
            eprintln!("no GPU adapter, skipping");
            return;
        };
        let limit = device.limits().max_texture_dimension_2d;
        let mut map = TextureMap::placeholder(
            &device,
            &queue,
            [0, 0, 0, 255],
            wgpu::TextureFormat::Rgba8UnormSrgb,
            "color map",
        );

        let wide = RgbaImage::from_pixel(limit + 1, 1, image::Rgba([200, 150, 100, 255]));
        map.upload(&device, &queue, &wide);

        assert_eq!(map.texture().size(), (limit, 1));
        assert_eq!(map.texture().mip_level_count(), mip_level_count(limit, 1));
    }

    #[test]
    fn upload_builds_full_mip_chain() {
        let Some((device, queue)) = headless_device() else {
            eprintln!("no GPU adapter, skipping");
            return;
        };
        let mut map = TextureMap::placeholder(
            &device,
            &queue,
            [0, 0, 0, 255],
            wgpu::TextureFormat::Rgba8Unorm,
            "reflectance map",
        );
        assert_eq!(map.texture().mip_level_count(), 1);

        map.upload(&device, &queue, &RgbaImage::new(64, 32));
        assert_eq!(map.texture().size(), (64, 32));
        assert_eq!(map.texture().mip_level_count(), 7);
    }
}

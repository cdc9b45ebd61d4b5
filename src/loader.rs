use std::{
    convert::Infallible,
    fmt,
    path::PathBuf,
    str::FromStr,
    sync::mpsc::{self, Receiver, TryRecvError},
    thread,
};

use image::RgbaImage;

/// Where a texture image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureSource {
    Url(String),
    Path(PathBuf),
}

impl FromStr for TextureSource {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("http://") || s.starts_with("https://") {
            Ok(TextureSource::Url(s.to_owned()))
        } else {
            Ok(TextureSource::Path(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for TextureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureSource::Url(url) => f.write_str(url),
            TextureSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("request to {url} failed")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("cannot read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode image from {origin}")]
    Decode {
        origin: String,
        #[source]
        source: image::ImageError,
    },
}

impl TextureSource {
    /// Fetch the raw encoded bytes. Blocks the calling thread.
    pub fn fetch(&self) -> Result<Vec<u8>, LoadError> {
        match self {
            TextureSource::Url(url) => {
                let fetch_err = |source| LoadError::Fetch {
                    url: url.clone(),
                    source,
                };
                let response = reqwest::blocking::get(url.as_str()).map_err(fetch_err)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(LoadError::Status {
                        url: url.clone(),
                        status,
                    });
                }
                Ok(response.bytes().map_err(fetch_err)?.to_vec())
            }
            TextureSource::Path(path) => std::fs::read(path).map_err(|source| LoadError::Io {
                path: path.clone(),
                source,
            }),
        }
    }

    /// Fetch and decode into RGBA8.
    pub fn load(&self) -> Result<RgbaImage, LoadError> {
        let bytes = self.fetch()?;
        let image = image::load_from_memory(&bytes).map_err(|source| LoadError::Decode {
            origin: self.to_string(),
            source,
        })?;
        Ok(image.to_rgba8())
    }
}

/// Material map a downloaded image is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapSlot {
    Color,
    Reflectance,
}

#[derive(Debug)]
pub struct LoadedImage {
    pub slot: MapSlot,
    pub image: RgbaImage,
}

/// Fire-and-forget texture downloads.
///
/// Each request runs on its own thread and reports back exactly once. There is
/// no retry and no timeout; a failure is logged and the slot keeps whatever
/// texture it already had. Dropping the loader abandons outstanding requests.
pub struct TextureLoader {
    receiver: Receiver<(MapSlot, Result<RgbaImage, LoadError>)>,
    pending: usize,
}

impl TextureLoader {
    pub fn spawn(requests: impl IntoIterator<Item = (MapSlot, TextureSource)>) -> Self {
        let (sender, receiver) = mpsc::channel();
        let mut pending = 0;

        for (slot, source) in requests {
            let sender = sender.clone();
            let spawned = thread::Builder::new()
                .name(format!("texture-{slot:?}").to_lowercase())
                .spawn(move || {
                    tracing::debug!(?slot, %source, "fetching texture");
                    // the receiver is gone once the view has been torn down
                    let _ = sender.send((slot, source.load()));
                });

            match spawned {
                Ok(_) => pending += 1,
                Err(err) => tracing::warn!(?slot, %err, "cannot start texture download"),
            }
        }

        Self { receiver, pending }
    }

    /// Collect every image that finished since the last poll. Never blocks.
    pub fn poll(&mut self) -> Vec<LoadedImage> {
        let mut loaded = Vec::new();
        while self.pending > 0 {
            match self.receiver.try_recv() {
                Ok((slot, result)) => {
                    self.pending -= 1;
                    match result {
                        Ok(image) => loaded.push(LoadedImage { slot, image }),
                        Err(err) => tracing::warn!(?slot, error = ?err, "texture load failed"),
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.pending = 0;
                }
            }
        }
        loaded
    }

    /// Number of requests that have not reported back yet.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn is_idle(&self) -> bool {
        self.pending == 0
    }
}

use base64::{engine::general_purpose, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use nowplaying_overlay_core::TrackIdentity;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtError {
    #[error("thumbnail is empty")]
    Empty,
    #[error("failed to decode thumbnail: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode thumbnail: {0}")]
    Encode(#[source] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtOptions {
    pub max_edge: u32,
    pub jpeg_quality: u8,
}

impl Default for ArtOptions {
    fn default() -> Self {
        Self {
            max_edge: 300,
            jpeg_quality: 75,
        }
    }
}

pub fn transcode_to_data_url(bytes: &[u8], options: ArtOptions) -> Result<String, ArtError> {
    if bytes.is_empty() {
        return Err(ArtError::Empty);
    }

    let img = image::load_from_memory(bytes).map_err(ArtError::Decode)?;
    let (width, height) = (img.width(), img.height());
    let longest = width.max(height);

    let img = if longest > options.max_edge {
        let scale = options.max_edge as f64 / longest as f64;
        let w = ((width as f64 * scale).round() as u32).max(1);
        let h = ((height as f64 * scale).round() as u32).max(1);
        img.resize_exact(w, h, FilterType::Triangle)
    } else {
        img
    };

    // JPEG has no alpha channel.
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, options.jpeg_quality)
        .encode_image(&rgb)
        .map_err(ArtError::Encode)?;

    Ok(format!(
        "data:image/jpeg;base64,{}",
        general_purpose::STANDARD.encode(&out)
    ))
}

#[derive(Debug, Default)]
pub struct AlbumArtCache {
    slot: Option<(TrackIdentity, Option<String>)>,
}

impl AlbumArtCache {
    pub fn get(&self, identity: &TrackIdentity) -> Option<Option<String>> {
        match &self.slot {
            Some((cached, art)) if cached == identity => Some(art.clone()),
            _ => None,
        }
    }

    pub fn store(&mut self, identity: TrackIdentity, art: Option<String>) {
        self.slot = Some((identity, art));
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }
}

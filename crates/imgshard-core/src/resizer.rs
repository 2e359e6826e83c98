//! Image transform contract (C6 stage S3, §6 "`Resizer` contract").
//!
//! The real transform is out of scope (§1): this module only defines
//! the seam and a minimal deterministic implementation sufficient to
//! exercise the processor end to end.

/// Outcome of one `Resizer::resize` call.
pub struct ResizeOutcome {
    pub image: Option<Vec<u8>>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub original_width: Option<i32>,
    pub original_height: Option<i32>,
    pub error_message: Option<String>,
}

impl ResizeOutcome {
    pub fn success(
        image: Vec<u8>,
        width: i32,
        height: i32,
        original_width: i32,
        original_height: i32,
    ) -> Self {
        Self {
            image: Some(image),
            width: Some(width),
            height: Some(height),
            original_width: Some(original_width),
            original_height: Some(original_height),
            error_message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            image: None,
            width: None,
            height: None,
            original_width: None,
            original_height: None,
            error_message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_message.is_none()
    }
}

/// §6: `resize(byte_stream, bbox_list?) -> (image_bytes, width, height,
/// original_width, original_height, error_message?)`.
pub trait Resizer: Send + Sync {
    fn resize(&self, bytes: &[u8], bbox: Option<&[f64]>) -> ResizeOutcome;
}

/// Minimal deterministic placeholder: treats `bytes` itself as the
/// "image" and derives a fake width/height from its length so tests can
/// assert dimension propagation without a real image codec. Refuses
/// empty input the way a real decoder would refuse an unparsable body.
pub struct CenterCropResizer {
    pub target_size: i32,
}

impl CenterCropResizer {
    pub fn new(target_size: i32) -> Self {
        Self { target_size }
    }
}

impl Resizer for CenterCropResizer {
    fn resize(&self, bytes: &[u8], bbox: Option<&[f64]>) -> ResizeOutcome {
        if bytes.is_empty() {
            return ResizeOutcome::failure("cannot identify image");
        }

        let (original_width, original_height) = match bbox {
            Some([x0, y0, x1, y1]) => ((x1 - x0).abs() as i32, (y1 - y0).abs() as i32),
            _ => {
                let n = bytes.len() as i32;
                (n.max(1), n.max(1))
            }
        };

        if original_width <= 0 || original_height <= 0 {
            return ResizeOutcome::failure("cannot identify image");
        }

        ResizeOutcome::success(
            bytes.to_vec(),
            self.target_size,
            self.target_size,
            original_width,
            original_height,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_success_populates_dimensions() {
        let resizer = CenterCropResizer::new(10);
        let outcome = resizer.resize(b"some jpeg bytes", None);
        assert!(outcome.is_success());
        assert_eq!(outcome.width, Some(10));
        assert_eq!(outcome.height, Some(10));
        assert!(outcome.original_width.unwrap() > 0);
    }

    #[test]
    fn resize_empty_body_fails() {
        let resizer = CenterCropResizer::new(10);
        let outcome = resizer.resize(b"", None);
        assert!(!outcome.is_success());
        assert_eq!(outcome.error_message.as_deref(), Some("cannot identify image"));
        assert!(outcome.width.is_none());
    }

    #[test]
    fn resize_with_bbox_uses_bbox_dims() {
        let resizer = CenterCropResizer::new(5);
        let outcome = resizer.resize(b"xyz", Some(&[0.0, 0.0, 20.0, 30.0]));
        assert_eq!(outcome.original_width, Some(20));
        assert_eq!(outcome.original_height, Some(30));
    }
}

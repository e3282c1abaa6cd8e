//! Spatial text tokens.
//!
//! Every OCR engine that reports geometry does so in its own native format:
//! axis-aligned boxes, four-point quads, or arbitrary polygons, sometimes with
//! junk mixed in. We reduce all of them to one axis-aligned bounding box in
//! image pixel space (y grows downward).

/// One recognized text fragment and its bounding box.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    /// The recognized text. Never empty.
    pub text: String,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Token {
    /// Create a token from an explicit box. Returns `None` for empty or
    /// whitespace-only text.
    pub fn new(text: &str, x1: f64, y1: f64, x2: f64, y2: f64) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_owned(),
            x1,
            y1,
            x2,
            y2,
        })
    }

    /// Create a token from polygon points, reducing to min/max extents.
    ///
    /// Returns `None` if the text is empty or the points are unusable. This is
    /// the isolate-and-skip path for malformed geometry: callers keep the
    /// detection's text in their line output even when we return `None` here.
    pub fn from_points(text: &str, points: &[(f64, f64)]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut xs = points.iter().map(|p| p.0);
        let mut ys = points.iter().map(|p| p.1);
        let (mut x1, mut x2) = {
            let first = xs.next()?;
            (first, first)
        };
        for x in xs {
            x1 = x1.min(x);
            x2 = x2.max(x);
        }
        let (mut y1, mut y2) = {
            let first = ys.next()?;
            (first, first)
        };
        for y in ys {
            y1 = y1.min(y);
            y2 = y2.max(y);
        }
        Self::new(text, x1, y1, x2, y2)
    }

    /// The vertical center of the box.
    pub fn y_center(&self) -> f64 {
        (self.y1 + self.y2) / 2.0
    }

    /// The horizontal center of the box.
    pub fn x_center(&self) -> f64 {
        (self.x1 + self.x2) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_text_is_dropped() {
        assert_eq!(Token::new("   ", 0.0, 0.0, 1.0, 1.0), None);
        assert_eq!(Token::from_points("\t\n", &[(0.0, 0.0)]), None);
    }

    #[test]
    fn test_polygon_reduces_to_extents() {
        let token =
            Token::from_points("hi", &[(4.0, 1.0), (9.0, 2.0), (6.0, 8.0)]).unwrap();
        assert_eq!((token.x1, token.y1, token.x2, token.y2), (4.0, 1.0, 9.0, 8.0));
    }
}

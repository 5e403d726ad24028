use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 360.0;
const MARGIN: f64 = 48.0;

/// Per-epoch loss values of one training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossHistory {
    pub losses: Vec<f64>,
}

impl LossHistory {
    pub fn push(&mut self, loss: f64) {
        self.losses.push(loss);
    }

    pub fn len(&self) -> usize {
        self.losses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.losses.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.losses.last().copied()
    }

    /// Renders the curve (epoch on x, loss on y) as a standalone SVG document.
    pub fn to_svg(&self, title: &str) -> String {
        let finite: Vec<f64> = self.losses.iter().copied().filter(|l| l.is_finite()).collect();
        let lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let (lo, hi) = if finite.is_empty() { (0.0, 1.0) } else if hi > lo { (lo, hi) } else { (lo - 0.5, hi + 0.5) };

        let plot_w = WIDTH - 2.0 * MARGIN;
        let plot_h = HEIGHT - 2.0 * MARGIN;
        let steps = self.losses.len().saturating_sub(1).max(1) as f64;

        let points: Vec<String> = self.losses.iter()
            .enumerate()
            .filter(|(_, l)| l.is_finite())
            .map(|(i, l)| {
                let x = MARGIN + plot_w * i as f64 / steps;
                let y = MARGIN + plot_h * (1.0 - (l - lo) / (hi - lo));
                format!("{x:.1},{y:.1}")
            })
            .collect();

        let mut svg = String::new();
        let _ = writeln!(svg, r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}">"#);
        let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
        let _ = writeln!(svg, r#"<text x="{}" y="24" text-anchor="middle" font-family="sans-serif" font-size="16">{}</text>"#, WIDTH / 2.0, escape(title));
        let _ = writeln!(
            svg,
            r#"<path d="M{m},{m} V{b} H{r}" fill="none" stroke="black" stroke-width="1"/>"#,
            m = MARGIN, b = HEIGHT - MARGIN, r = WIDTH - MARGIN
        );
        let _ = writeln!(svg, r#"<text x="4" y="{}" font-family="sans-serif" font-size="11">{hi:.4}</text>"#, MARGIN + 4.0);
        let _ = writeln!(svg, r#"<text x="4" y="{}" font-family="sans-serif" font-size="11">{lo:.4}</text>"#, HEIGHT - MARGIN);
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="end" font-family="sans-serif" font-size="11">epoch {}</text>"#,
            WIDTH - MARGIN, HEIGHT - MARGIN + 18.0, self.losses.len()
        );
        if !points.is_empty() {
            let _ = writeln!(svg, r#"<polyline points="{}" fill="none" stroke="steelblue" stroke-width="2"/>"#, points.join(" "));
        }
        svg.push_str("</svg>\n");
        svg
    }

    pub fn plot(&self, path: impl AsRef<Path>, title: &str) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_svg(title))?;
        Ok(())
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

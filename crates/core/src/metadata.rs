use image::DynamicImage;
use regex::Regex;
use std::collections::HashMap;

/// Named reference colors. Dominant pixel clusters map to the nearest
/// entry, and clusters further than `COLOR_DISTANCE_LIMIT` from every
/// entry produce no tag at all.
const NAMED_COLORS: &[(&str, [i32; 3])] = &[
    ("Black", [0, 0, 0]),
    ("White", [255, 255, 255]),
    ("Red", [255, 0, 0]),
    ("Blue", [0, 0, 255]),
    ("Green", [0, 128, 0]),
    ("Yellow", [255, 255, 0]),
    ("Orange", [255, 165, 0]),
    ("Purple", [128, 0, 128]),
    ("Pink", [255, 192, 203]),
    ("Brown", [165, 42, 42]),
    ("Gray", [128, 128, 128]),
    ("Beige", [245, 245, 220]),
    ("Navy", [0, 0, 128]),
];

const COLOR_DISTANCE_LIMIT: i32 = 100 * 100;

const STYLE_KEYWORDS: &[&str] = &[
    "streetwear", "minimal", "luxury", "casual", "vintage", "formal", "sporty", "ethnic",
];

/// Side length the image is shrunk to before pixels are sampled.
const SAMPLE_SIDE: u32 = 150;

/// Pixel values are snapped to this grid before counting, so near-identical
/// shades land in one cluster.
const QUANT_STEP: u8 = 32;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedMetadata {
    pub colors: Vec<String>,
    pub styles: Vec<String>,
    pub brands: Vec<String>,
}

/// Derives colors from pixels and styles/brands from caption text.
pub struct MetadataExtractor {
    top_k_colors: usize,
    brand_pattern: Regex,
}

impl MetadataExtractor {
    pub fn new(top_k_colors: usize) -> Result<Self, regex::Error> {
        Ok(Self {
            top_k_colors,
            brand_pattern: Regex::new(r"\b([A-Z][A-Za-z0-9&]+)\b")?,
        })
    }

    pub fn extract_all(
        &self,
        image: Option<&DynamicImage>,
        caption: Option<&str>,
    ) -> ExtractedMetadata {
        let mut result = ExtractedMetadata::default();

        if let Some(caption) = caption {
            result.styles = self.extract_styles(caption);
            result.brands = self.extract_brands(caption);
        }
        if let Some(image) = image {
            let pixels = sample_pixels(image);
            result.colors = self.extract_colors(&pixels);
        }
        // Color words in the caption count too, without duplicating what
        // the pixels already said.
        if let Some(caption) = caption {
            result.colors = merge_tags(result.colors, &extract_caption_colors(caption));
        }
        result
    }

    /// Quantizes sampled pixels, takes the `top_k_colors` largest clusters
    /// and names each one by its closest reference color.
    pub fn extract_colors(&self, pixels: &[[u8; 3]]) -> Vec<String> {
        let mut clusters: HashMap<[u8; 3], usize> = HashMap::new();
        for pixel in pixels {
            let quantized = [
                pixel[0] - pixel[0] % QUANT_STEP,
                pixel[1] - pixel[1] % QUANT_STEP,
                pixel[2] - pixel[2] % QUANT_STEP,
            ];
            *clusters.entry(quantized).or_insert(0) += 1;
        }

        let mut ordered: Vec<([u8; 3], usize)> = clusters.into_iter().collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut colors = Vec::new();
        for (rgb, _) in ordered.into_iter().take(self.top_k_colors) {
            if let Some(name) = closest_color_name(rgb) {
                push_unique(&mut colors, name.to_string());
            }
        }
        colors
    }

    pub fn extract_styles(&self, caption: &str) -> Vec<String> {
        let lowered = caption.to_lowercase();
        STYLE_KEYWORDS
            .iter()
            .filter(|style| lowered.contains(**style))
            .map(|style| style.to_string())
            .collect()
    }

    /// Capitalized-token heuristic over the original-case caption. Crude,
    /// but captures most brand mentions in scraped captions without a
    /// brand dictionary.
    pub fn extract_brands(&self, caption: &str) -> Vec<String> {
        let mut brands = Vec::new();
        for capture in self.brand_pattern.captures_iter(caption) {
            if let Some(token) = capture.get(1) {
                let token = token.as_str().trim();
                if token.len() > 1 {
                    push_unique(&mut brands, token.to_string());
                }
            }
        }
        brands
    }
}

/// Shrinks the image and collects its RGB pixels for clustering.
pub fn sample_pixels(image: &DynamicImage) -> Vec<[u8; 3]> {
    let thumbnail = image.thumbnail(SAMPLE_SIDE, SAMPLE_SIDE).to_rgb8();
    thumbnail.pixels().map(|pixel| pixel.0).collect()
}

/// Named colors mentioned literally in caption text.
pub fn extract_caption_colors(caption: &str) -> Vec<String> {
    let lowered = caption.to_lowercase();
    NAMED_COLORS
        .iter()
        .filter(|(name, _)| lowered.contains(&name.to_lowercase()))
        .map(|(name, _)| name.to_string())
        .collect()
}

fn closest_color_name(rgb: [u8; 3]) -> Option<&'static str> {
    let mut best: Option<(&'static str, i32)> = None;
    for (name, reference) in NAMED_COLORS {
        let dr = rgb[0] as i32 - reference[0];
        let dg = rgb[1] as i32 - reference[1];
        let db = rgb[2] as i32 - reference[2];
        let distance = dr * dr + dg * dg + db * db;
        if best.is_none() || best.is_some_and(|(_, d)| distance < d) {
            best = Some((name, distance));
        }
    }
    best.filter(|(_, distance)| *distance < COLOR_DISTANCE_LIMIT)
        .map(|(name, _)| name)
}

/// Appends `value` unless an equal entry (ignoring case) already exists,
/// preserving insertion order.
pub fn push_unique(values: &mut Vec<String>, value: String) {
    if !values
        .iter()
        .any(|existing| existing.eq_ignore_ascii_case(&value))
    {
        values.push(value);
    }
}

/// Merges caption-provided tags with extracted ones without duplication.
pub fn merge_tags(extracted: Vec<String>, provided: &[String]) -> Vec<String> {
    let mut merged = extracted;
    for tag in provided {
        let trimmed = tag.trim();
        if !trimmed.is_empty() {
            push_unique(&mut merged, trimmed.to_string());
        }
    }
    merged
}

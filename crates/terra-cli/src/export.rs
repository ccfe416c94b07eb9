//! 16-bit grayscale PNG export of a height field.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use terra_erosion::{DisplacementRange, HeightField};

use crate::error::CliError;

/// Map heights onto `0..=u16::MAX` using `range`. A flat range maps to 0.
pub fn normalize(field: &HeightField, range: DisplacementRange) -> Vec<u16> {
    let span = range.span();
    field
        .values()
        .iter()
        .map(|&h| {
            if span <= 0.0 {
                return 0;
            }
            let t = ((h - range.min) / span).clamp(0.0, 1.0);
            (t * f32::from(u16::MAX)).round() as u16
        })
        .collect()
}

/// Encode samples as big-endian 16-bit grayscale.
pub fn encode_png(width: u32, height: u32, samples: &[u16]) -> Result<Vec<u8>, png::EncodingError> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_be_bytes());
    }

    let mut png_buf = Vec::new();
    {
        let mut encoder = png::Encoder::new(std::io::Cursor::new(&mut png_buf), width, height);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Sixteen);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&bytes)?;
    }
    Ok(png_buf)
}

/// Write `field` to `path`, normalised by `range`.
pub fn export_height_map(
    path: &Path,
    field: &HeightField,
    range: DisplacementRange,
) -> Result<(), CliError> {
    let fail = |reason: String| CliError::Export {
        path: path.to_path_buf(),
        reason,
    };

    let samples = normalize(field, range);
    let png = encode_png(field.width(), field.height(), &samples).map_err(|e| fail(e.to_string()))?;
    let file = File::create(path).map_err(|e| fail(e.to_string()))?;
    let mut writer = BufWriter::new(file);
    std::io::Write::write_all(&mut writer, &png).map_err(|e| fail(e.to_string()))?;
    std::io::Write::flush(&mut writer).map_err(|e| fail(e.to_string()))?;
    tracing::info!(path = %path.display(), "Exported height map");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(min: f32, max: f32) -> DisplacementRange {
        DisplacementRange { min, max }
    }

    #[test]
    fn test_normalize_spans_full_range() {
        let field = HeightField::new(3, 1, vec![-2.0, 0.0, 2.0]).unwrap();
        assert_eq!(normalize(&field, range(-2.0, 2.0)), [0, 32768, u16::MAX]);
    }

    #[test]
    fn test_normalize_flat_field_is_black() {
        let field = HeightField::flat(2, 2, 5.0);
        assert_eq!(normalize(&field, range(5.0, 5.0)), [0; 4]);
    }

    #[test]
    fn test_normalize_clamps_outside_range() {
        let field = HeightField::new(2, 1, vec![-10.0, 10.0]).unwrap();
        assert_eq!(normalize(&field, range(0.0, 1.0)), [0, u16::MAX]);
    }

    #[test]
    fn test_encoded_png_decodes_to_same_samples() {
        let samples = [0u16, 1, 256, u16::MAX];
        let png = encode_png(2, 2, &samples).unwrap();

        let decoder = png::Decoder::new(std::io::Cursor::new(png));
        let mut reader = decoder.read_info().unwrap();
        let info = reader.info();
        assert_eq!((info.width, info.height), (2, 2));
        assert_eq!(info.bit_depth, png::BitDepth::Sixteen);
        assert_eq!(info.color_type, png::ColorType::Grayscale);

        let mut buf = vec![0; reader.output_buffer_size()];
        reader.next_frame(&mut buf).unwrap();
        let decoded: Vec<u16> = buf
            .chunks_exact(2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_export_writes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("height.png");
        let field = HeightField::new(2, 1, vec![0.0, 1.0]).unwrap();
        export_height_map(&path, &field, range(0.0, 1.0)).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}

//! Local OCR engine wrapping the `tesseract` CLI tool.
//!
//! We ask tesseract for TSV output, which carries a bounding box and a
//! confidence for every word. That gives us real spatial tokens, so this is
//! the engine that exercises table reconstruction.

use std::io::Write as _;

use tokio::process::Command;

use crate::{
    exec::check_for_command_failure,
    normalize::{TableOpts, Token, normalize_to_markdown},
    prelude::*,
    record::Line,
};

use super::{EngineInput, EngineOutput, EngineSpec, OcrEngine, engine_spec};

pub struct TesseractEngine {
    spec: &'static EngineSpec,
    table_opts: TableOpts,
}

impl TesseractEngine {
    pub fn new(table_opts: &TableOpts) -> Result<Self> {
        Ok(Self {
            spec: engine_spec("tesseract")?,
            table_opts: table_opts.clone(),
        })
    }
}

#[async_trait::async_trait]
impl OcrEngine for TesseractEngine {
    fn spec(&self) -> &'static EngineSpec {
        self.spec
    }

    #[instrument(level = "debug", skip_all, fields(filename = %input.filename))]
    async fn recognize(&self, input: &EngineInput) -> Result<EngineOutput> {
        let extension = mime_guess::get_mime_extensions_str(&input.mime_type)
            .and_then(|o| o.first())
            .ok_or_else(|| {
                anyhow!("cannot determine extension for {}", input.mime_type)
            })?;

        // Write our input to a temporary file.
        let tmpdir = tempfile::TempDir::with_prefix("tesseract")?;
        let input_path = tmpdir.path().join(format!("input.{}", extension));
        let output_base = tmpdir.path().join("output");
        let mut input_file = std::fs::File::create(&input_path)
            .context("cannot create tesseract input file")?;
        input_file
            .write_all(&input.bytes)
            .context("cannot write tesseract input file")?;
        input_file.flush().context("cannot flush tesseract input file")?;

        // Run tesseract on the input file, asking for TSV output.
        let output = Command::new("tesseract")
            .arg(&input_path)
            .arg(&output_base)
            .arg("tsv")
            .output()
            .await
            .context("cannot run tesseract")?;
        check_for_command_failure("tesseract", &output)?;

        let tsv = std::fs::read_to_string(output_base.with_extension("tsv"))
            .context("cannot read tesseract output file")?;
        let (tokens, lines) = parse_tsv(&tsv);

        let plain = lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let text = normalize_to_markdown(&plain, Some(&tokens), &self.table_opts);

        Ok(EngineOutput {
            text,
            lines,
            ..EngineOutput::default()
        })
    }
}

/// One word row out of tesseract's TSV output.
struct TsvWord {
    line_key: (u32, u32, u32, u32),
    token: Option<Token>,
    text: String,
    conf: Option<f64>,
}

/// Parse tesseract's TSV output into spatial tokens and display lines.
///
/// TSV columns: level, page_num, block_num, par_num, line_num, word_num,
/// left, top, width, height, conf, text. Word rows have level 5. Rows with
/// unparseable geometry keep their text and lose their box; rows with empty
/// text are dropped entirely.
fn parse_tsv(tsv: &str) -> (Vec<Token>, Vec<Line>) {
    let mut words: Vec<TsvWord> = vec![];
    for row in tsv.lines().skip(1) {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 || fields[0] != "5" {
            continue;
        }
        // The text field is last and may itself contain tabs.
        let text = fields[11..].join("\t");
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        let line_key = (
            fields[1].parse().unwrap_or(0),
            fields[2].parse().unwrap_or(0),
            fields[3].parse().unwrap_or(0),
            fields[4].parse().unwrap_or(0),
        );
        let geometry = (
            fields[6].parse::<f64>(),
            fields[7].parse::<f64>(),
            fields[8].parse::<f64>(),
            fields[9].parse::<f64>(),
        );
        let token = match geometry {
            (Ok(left), Ok(top), Ok(width), Ok(height)) => Token::from_points(
                text,
                &[(left, top), (left + width, top + height)],
            ),
            // Malformed geometry: keep the text, drop the box.
            _ => None,
        };
        let conf = fields[10]
            .parse::<f64>()
            .ok()
            .filter(|conf| *conf >= 0.0)
            .map(|conf| conf / 100.0);
        words.push(TsvWord {
            line_key,
            token,
            text: text.to_owned(),
            conf,
        });
    }

    let tokens: Vec<Token> = words.iter().filter_map(|w| w.token.clone()).collect();

    // Group words into display lines, in source order.
    let mut lines: Vec<Line> = vec![];
    let mut current_key = None;
    let mut current_words: Vec<&TsvWord> = vec![];
    for word in &words {
        if current_key != Some(word.line_key) {
            if !current_words.is_empty() {
                lines.push(line_from_words(&current_words));
                current_words.clear();
            }
            current_key = Some(word.line_key);
        }
        current_words.push(word);
    }
    if !current_words.is_empty() {
        lines.push(line_from_words(&current_words));
    }

    (tokens, lines)
}

/// Merge one TSV line's words into a [`Line`], averaging confidences and
/// taking the union of the word boxes.
fn line_from_words(words: &[&TsvWord]) -> Line {
    let text = words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ");

    let confs: Vec<f64> = words.iter().filter_map(|w| w.conf).collect();
    let score = if confs.is_empty() {
        None
    } else {
        Some(confs.iter().sum::<f64>() / confs.len() as f64)
    };

    let boxes: Vec<&Token> = words.iter().filter_map(|w| w.token.as_ref()).collect();
    let box_points = if boxes.is_empty() {
        None
    } else {
        let x1 = boxes.iter().map(|t| t.x1).fold(f64::INFINITY, f64::min);
        let y1 = boxes.iter().map(|t| t.y1).fold(f64::INFINITY, f64::min);
        let x2 = boxes.iter().map(|t| t.x2).fold(f64::NEG_INFINITY, f64::max);
        let y2 = boxes.iter().map(|t| t.y2).fold(f64::NEG_INFINITY, f64::max);
        Some(vec![[x1, y1], [x2, y1], [x2, y2], [x1, y2]])
    };

    Line {
        text,
        score,
        box_points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word_row(line: u32, word: u32, left: u32, top: u32, conf: &str, text: &str) -> String {
        format!("5\t1\t1\t1\t{line}\t{word}\t{left}\t{top}\t40\t10\t{conf}\t{text}")
    }

    #[test]
    fn test_parse_tsv_words_and_lines() {
        let tsv = [
            HEADER.to_owned(),
            "1\t1\t0\t0\t0\t0\t0\t0\t600\t800\t-1\t".to_owned(),
            word_row(1, 1, 0, 0, "91.5", "Name"),
            word_row(1, 2, 100, 0, "88.0", "Qty"),
            word_row(2, 1, 0, 20, "95.0", "Pen"),
        ]
        .join("\n");
        let (tokens, lines) = parse_tsv(&tsv);
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text, "Name");
        assert_eq!((tokens[0].x1, tokens[0].y2), (0.0, 10.0));

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Name Qty");
        assert!((lines[0].score.unwrap() - 0.8975).abs() < 1e-9);
        assert_eq!(lines[1].text, "Pen");
        assert_eq!(lines[1].box_points.as_ref().unwrap()[0], [0.0, 20.0]);
    }

    #[test]
    fn test_malformed_geometry_keeps_text() {
        let tsv = format!(
            "{}\n5\t1\t1\t1\t1\t1\tnot-a-number\t0\t40\t10\t90.0\tHello",
            HEADER
        );
        let (tokens, lines) = parse_tsv(&tsv);
        assert_eq!(tokens.len(), 0);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Hello");
        assert_eq!(lines[0].box_points, None);
    }

    #[test]
    fn test_empty_text_rows_dropped() {
        let tsv = format!("{}\n{}", HEADER, word_row(1, 1, 0, 0, "90.0", "  "));
        let (tokens, lines) = parse_tsv(&tsv);
        assert!(tokens.is_empty());
        assert!(lines.is_empty());
    }

    #[test]
    fn test_tab_inside_text_is_preserved() {
        let tsv = format!("{}\n{}", HEADER, word_row(1, 1, 0, 0, "90.0", "A\tB"));
        let (tokens, lines) = parse_tsv(&tsv);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "A\tB");
        assert_eq!(lines[0].text, "A\tB");
    }

    #[test]
    fn test_negative_conf_means_unknown() {
        let tsv = format!("{}\n{}", HEADER, word_row(1, 1, 0, 0, "-1", "Hi"));
        let (_, lines) = parse_tsv(&tsv);
        assert_eq!(lines[0].score, None);
    }
}

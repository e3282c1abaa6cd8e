//! Reconstructing tables from spatial tokens.
//!
//! Engines that return word boxes but no structure (tesseract and friends)
//! often come from invoices and receipts, where the interesting content is a
//! grid. We cluster tokens into rows by vertical center, infer column centers
//! across the whole page, and render a Markdown table when the result
//! actually looks tabular.

use clap::Args;

use super::token::Token;

/// Tuning knobs for table reconstruction.
///
/// The tolerances are in source-image pixels and are *not* derived from the
/// image DPI or font metrics, so they may need adjustment for unusually
/// high-resolution scans. That's why they're options rather than constants.
#[derive(Args, Clone, Debug)]
pub struct TableOpts {
    /// How far (in pixels) a token's vertical center may sit from the first
    /// token of a row and still join that row.
    #[clap(long, default_value = "10.0")]
    pub row_tolerance: f64,

    /// Minimum horizontal distance (in pixels) between distinct column
    /// centers.
    #[clap(long, default_value = "35.0")]
    pub column_threshold: f64,

    /// Maximum number of table columns to infer.
    #[clap(long, default_value = "8")]
    pub max_columns: usize,
}

impl Default for TableOpts {
    fn default() -> Self {
        Self {
            row_tolerance: 10.0,
            column_threshold: 35.0,
            max_columns: 8,
        }
    }
}

/// Group tokens into rows by vertical center.
///
/// Single-pass greedy clustering over center-sorted tokens: a token starts a
/// new row when it sits more than `row_tolerance` below the *first* token of
/// the current row. Tokens are never reconsidered once assigned. Each row is
/// then sorted left-to-right.
fn cluster_rows(tokens: &[Token], opts: &TableOpts) -> Vec<Vec<Token>> {
    let mut sorted = tokens.to_vec();
    sorted.sort_by(|a, b| a.y_center().total_cmp(&b.y_center()));

    let mut rows: Vec<Vec<Token>> = vec![];
    let mut current: Vec<Token> = vec![];
    let mut anchor_y: Option<f64> = None;
    for token in sorted {
        match anchor_y {
            Some(anchor) if (token.y_center() - anchor).abs() <= opts.row_tolerance => {
                current.push(token);
            }
            Some(_) => {
                rows.push(std::mem::take(&mut current));
                anchor_y = Some(token.y_center());
                current.push(token);
            }
            None => {
                anchor_y = Some(token.y_center());
                current.push(token);
            }
        }
    }
    if !current.is_empty() {
        rows.push(current);
    }

    for row in &mut rows {
        row.sort_by(|a, b| a.x1.total_cmp(&b.x1));
    }
    rows
}

/// Infer column centers from token horizontal centers.
///
/// Sorted centers are greedily merged while they stay within
/// `column_threshold` of the running estimate; each merge moves the estimate
/// to the midpoint of the merged values. This is an online running average,
/// not k-means, and it's good enough for left-aligned document grids.
fn infer_columns(rows: &[Vec<Token>], opts: &TableOpts) -> Vec<f64> {
    let mut centers: Vec<f64> = rows
        .iter()
        .flat_map(|row| row.iter().map(Token::x_center))
        .collect();
    if centers.is_empty() {
        return vec![];
    }
    centers.sort_by(f64::total_cmp);

    let mut columns = vec![centers[0]];
    for x in &centers[1..] {
        let last = columns.last_mut().expect("columns is never empty here");
        if (x - *last).abs() > opts.column_threshold {
            columns.push(*x);
        } else {
            *last = (*last + x) / 2.0;
        }
    }
    columns.truncate(opts.max_columns);
    columns
}

/// Assign a row's tokens to the nearest column centers.
///
/// Tokens arrive left-to-right, so when two tokens land in the same cell the
/// accumulated text stays in reading order.
fn assign_to_columns(row: &[Token], columns: &[f64]) -> Vec<String> {
    if columns.is_empty() {
        let joined = row
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        return vec![joined.trim().to_owned()];
    }

    let mut cells = vec![String::new(); columns.len()];
    for token in row {
        let xc = token.x_center();
        let nearest = columns
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (*a - xc).abs().total_cmp(&(*b - xc).abs()))
            .map(|(idx, _)| idx)
            .expect("columns is non-empty");
        if cells[nearest].is_empty() {
            cells[nearest] = token.text.clone();
        } else {
            cells[nearest].push(' ');
            cells[nearest].push_str(&token.text);
        }
    }
    cells
}

/// Escape a cell for Markdown table rendering.
fn md_escape(cell: &str) -> String {
    cell.replace('\n', " ").replace('|', "\\|").trim().to_owned()
}

/// Convert spatial tokens into a Markdown table.
///
/// Returns `None` when the tokens don't look tabular: fewer than two rows, or
/// everything collapsing into a single populated column. The first row
/// becomes the header when at least half of its cells (minimum 2) are
/// non-empty; otherwise we synthesize `Col 1..N` headers and keep it as data.
pub fn tokens_to_markdown_table(tokens: &[Token], opts: &TableOpts) -> Option<String> {
    let rows = cluster_rows(tokens, opts);
    if rows.len() < 2 {
        return None;
    }

    let columns = infer_columns(&rows, opts);
    let grid: Vec<Vec<String>> =
        rows.iter().map(|row| assign_to_columns(row, &columns)).collect();

    // Trim empty trailing columns, and reject effectively single-column grids.
    let max_used = grid
        .iter()
        .flat_map(|row| {
            row.iter()
                .enumerate()
                .filter(|(_, cell)| !cell.is_empty())
                .map(|(idx, _)| idx + 1)
        })
        .max()
        .unwrap_or(0);
    if max_used <= 1 {
        return None;
    }
    let grid: Vec<Vec<String>> = grid
        .into_iter()
        .map(|mut row| {
            row.truncate(max_used);
            row.resize(max_used, String::new());
            row
        })
        .collect();

    let first = &grid[0];
    let populated = first.iter().filter(|cell| !cell.is_empty()).count();
    let (header, body): (Vec<String>, &[Vec<String>]) =
        if populated >= 2.max(first.len() / 2) {
            (first.clone(), &grid[1..])
        } else {
            let generic = (1..=max_used).map(|i| format!("Col {}", i)).collect();
            (generic, &grid[..])
        };

    let mut md = Vec::with_capacity(grid.len() + 2);
    md.push(format!(
        "| {} |",
        header.iter().map(|h| md_escape(h)).collect::<Vec<_>>().join(" | ")
    ));
    md.push(format!("| {} |", vec!["---"; header.len()].join(" | ")));
    for row in body {
        md.push(format!(
            "| {} |",
            row.iter().map(|c| md_escape(c)).collect::<Vec<_>>().join(" | ")
        ));
    }
    Some(md.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str, x1: f64, y1: f64, x2: f64, y2: f64) -> Token {
        Token::new(text, x1, y1, x2, y2).unwrap()
    }

    fn invoice_tokens() -> Vec<Token> {
        vec![
            token("Name", 0.0, 0.0, 40.0, 10.0),
            token("Qty", 100.0, 0.0, 130.0, 10.0),
            token("Pen", 0.0, 20.0, 40.0, 30.0),
            token("3", 100.0, 20.0, 130.0, 30.0),
        ]
    }

    #[test]
    fn test_two_by_two_grid() {
        let md = tokens_to_markdown_table(&invoice_tokens(), &TableOpts::default())
            .unwrap();
        assert_eq!(md, "| Name | Qty |\n| --- | --- |\n| Pen | 3 |");
    }

    #[test]
    fn test_clustering_invariant_to_input_order() {
        let mut shuffled = invoice_tokens();
        shuffled.reverse();
        shuffled.swap(0, 2);
        assert_eq!(
            tokens_to_markdown_table(&shuffled, &TableOpts::default()),
            tokens_to_markdown_table(&invoice_tokens(), &TableOpts::default()),
        );
    }

    #[test]
    fn test_single_row_is_not_a_table() {
        let tokens = vec![
            token("Name", 0.0, 0.0, 40.0, 10.0),
            token("Qty", 100.0, 0.0, 130.0, 10.0),
        ];
        assert_eq!(tokens_to_markdown_table(&tokens, &TableOpts::default()), None);
    }

    #[test]
    fn test_single_column_is_not_a_table() {
        let tokens = vec![
            token("First line", 0.0, 0.0, 80.0, 10.0),
            token("Second line", 0.0, 20.0, 80.0, 30.0),
            token("Third line", 0.0, 40.0, 80.0, 50.0),
        ];
        assert_eq!(tokens_to_markdown_table(&tokens, &TableOpts::default()), None);
    }

    #[test]
    fn test_mostly_empty_header_becomes_generic() {
        // Row 0 has one populated cell out of two, so it's kept as data.
        let tokens = vec![
            token("Intro", 0.0, 0.0, 40.0, 10.0),
            token("Pen", 0.0, 20.0, 40.0, 30.0),
            token("3", 100.0, 20.0, 130.0, 30.0),
            token("Ink", 0.0, 40.0, 40.0, 50.0),
            token("5", 100.0, 40.0, 130.0, 50.0),
        ];
        let md = tokens_to_markdown_table(&tokens, &TableOpts::default()).unwrap();
        assert!(md.starts_with("| Col 1 | Col 2 |"), "got: {}", md);
        assert!(md.contains("| Intro |"), "got: {}", md);
        assert!(md.contains("| Pen | 3 |"), "got: {}", md);
    }

    #[test]
    fn test_cell_collision_joins_in_reading_order() {
        let tokens = vec![
            token("Item", 0.0, 0.0, 40.0, 10.0),
            token("Price", 200.0, 0.0, 240.0, 10.0),
            token("Blue", 0.0, 20.0, 30.0, 30.0),
            token("pen", 32.0, 20.0, 60.0, 30.0),
            token("4.00", 200.0, 20.0, 240.0, 30.0),
        ];
        let md = tokens_to_markdown_table(&tokens, &TableOpts::default()).unwrap();
        assert!(md.contains("| Blue pen | 4.00 |"), "got: {}", md);
    }

    #[test]
    fn test_pipe_characters_escaped() {
        let tokens = vec![
            token("A|B", 0.0, 0.0, 40.0, 10.0),
            token("Qty", 100.0, 0.0, 130.0, 10.0),
            token("x", 0.0, 20.0, 40.0, 30.0),
            token("1", 100.0, 20.0, 130.0, 30.0),
        ];
        let md = tokens_to_markdown_table(&tokens, &TableOpts::default()).unwrap();
        assert!(md.contains("A\\|B"), "got: {}", md);
    }

    #[test]
    fn test_max_columns_cap() {
        let opts = TableOpts {
            max_columns: 2,
            ..TableOpts::default()
        };
        // Three well-separated columns, but only two centers survive the cap.
        let tokens = vec![
            token("A", 0.0, 0.0, 10.0, 10.0),
            token("B", 100.0, 0.0, 110.0, 10.0),
            token("C", 200.0, 0.0, 210.0, 10.0),
            token("D", 0.0, 20.0, 10.0, 30.0),
            token("E", 100.0, 20.0, 110.0, 30.0),
            token("F", 200.0, 20.0, 210.0, 30.0),
        ];
        let md = tokens_to_markdown_table(&tokens, &opts).unwrap();
        assert!(md.starts_with("| A | B C |"), "got: {}", md);
    }
}

//! Markdown rendering of extracted pages

use crate::extract::{PageRecord, TableRecord};

/// Renders a page as a markdown document
///
/// Layout: title heading, source link, content text, then each table under
/// its own heading when `include_tables` is set.
pub fn render_page(page: &PageRecord, include_tables: bool) -> String {
    let mut md = Vec::new();

    md.push(format!("# {}", page.title));
    md.push(String::new());
    md.push(format!("Source: [{}]({})", page.url, page.url));
    md.push(String::new());
    md.push(page.content.clone());

    if include_tables && !page.tables.is_empty() {
        md.push(String::new());
        md.push("## Tables".to_string());

        for table in &page.tables {
            md.push(String::new());
            md.push(format!("### {}", table.title));
            md.push(String::new());
            render_table(table, &mut md);
        }
    }

    let mut out = md.join("\n");
    out.push('\n');
    out
}

fn render_table(table: &TableRecord, md: &mut Vec<String>) {
    let width = table
        .rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(table.headers.len()))
        .max()
        .unwrap_or(0);
    if width == 0 {
        return;
    }

    let headers: Vec<String> = if table.headers.is_empty() {
        (1..=width).map(|i| format!("Column {}", i)).collect()
    } else {
        table.headers.iter().map(|h| escape_cell(h)).collect()
    };

    md.push(format!("| {} |", headers.join(" | ")));
    md.push(format!("| {} |", vec!["---"; headers.len()].join(" | ")));

    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(|c| escape_cell(c)).collect();
        md.push(format!("| {} |", cells.join(" | ")));
    }
}

/// Keeps a cell on one line and out of the column syntax
fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace('\n', " ")
}

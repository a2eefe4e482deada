//! HTML table handling.
//!
//! `htmd` 0.1 flattens tables into loose text, so tables are rendered to
//! Markdown here and carried through conversion as placeholder tokens.

use scraper::node::Text;
use scraper::{ElementRef, Html, Node, Selector};

use crate::codeblocks::{PlaceholderKind, PlaceholderScheme};

/// HTML with tables lifted out, plus the Markdown for each one.
pub(crate) struct LiftedTables {
    pub html: String,
    pub tables: Vec<String>,
}

/// Replace every outermost `<table>` in `html` with a placeholder token.
///
/// A table holding a code placeholder is a layout table: its cells become
/// plain paragraphs so no fenced block ends up inside a pipe row.
pub(crate) fn lift_tables(html: &str, scheme: &PlaceholderScheme) -> LiftedTables {
    let mut doc = Html::parse_fragment(html);
    let table_sel = Selector::parse("table").expect("valid selector");

    let plan: Vec<_> = doc
        .select(&table_sel)
        .filter(|t| {
            !t.ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| a.value().name() == "table")
        })
        .map(|t| {
            let markdown = if holds_code(&t, scheme) {
                layout_table_to_markdown(&t)
            } else {
                html_table_to_markdown(&t)
            };
            (t.id(), markdown)
        })
        .collect();

    if plan.is_empty() {
        return LiftedTables {
            html: html.to_string(),
            tables: Vec::new(),
        };
    }

    let mut tables = Vec::with_capacity(plan.len());
    for (node_id, markdown) in plan {
        if let Some(mut node) = doc.tree.get_mut(node_id) {
            let token = scheme.token(PlaceholderKind::Table, tables.len());
            node.insert_before(Node::Text(Text {
                text: token.as_str().into(),
            }));
            node.detach();
            tables.push(markdown);
        }
    }

    LiftedTables {
        html: doc.root_element().inner_html(),
        tables,
    }
}

/// Put rendered tables back in place of their tokens, each as its own block.
pub(crate) fn restore_tables(markdown: &str, tables: &[String], scheme: &PlaceholderScheme) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut cursor = 0;
    for m in scheme.find_tokens(PlaceholderKind::Table, markdown) {
        out.push_str(&markdown[cursor..m.start]);
        if let Some(table) = tables.get(m.id) {
            out.push_str("\n\n");
            out.push_str(table);
            out.push_str("\n\n");
        }
        cursor = m.end;
    }
    out.push_str(&markdown[cursor..]);
    out
}

fn holds_code(table: &ElementRef<'_>, scheme: &PlaceholderScheme) -> bool {
    let text: String = table.text().collect();
    !scheme.find_tokens(PlaceholderKind::Code, &text).is_empty()
}

/// Each non-empty cell as its own paragraph, in document order.
fn layout_table_to_markdown(table: &ElementRef<'_>) -> String {
    let cell_sel = Selector::parse("th, td").expect("valid selector");
    table
        .select(&cell_sel)
        .filter(|cell| {
            // Nested cells are reached through their own table.
            !cell
                .ancestors()
                .filter_map(ElementRef::wrap)
                .take_while(|a| a.id() != table.id())
                .any(|a| matches!(a.value().name(), "td" | "th"))
        })
        .map(|cell| flat_text(&cell))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Convert a single HTML table element to a Markdown table string.
fn html_table_to_markdown(table: &ElementRef<'_>) -> String {
    let tr_sel = Selector::parse("tr").expect("valid selector");
    let cell_sel = Selector::parse("th, td").expect("valid selector");

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut has_header = false;

    for (i, tr) in table.select(&tr_sel).enumerate() {
        let cells: Vec<ElementRef<'_>> = tr.select(&cell_sel).collect();
        if cells.is_empty() {
            continue;
        }
        if i == 0 && cells.iter().all(|c| c.value().name() == "th") {
            has_header = true;
        }
        rows.push(cells.iter().map(cell_text).collect());
    }

    let col_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    if col_count == 0 {
        return String::new();
    }
    for row in &mut rows {
        row.resize(col_count, String::new());
    }

    let mut md = String::new();
    let header = if has_header {
        rows.remove(0)
    } else {
        vec![String::new(); col_count]
    };
    push_row(&mut md, &header);
    push_row(&mut md, &vec!["---".to_string(); col_count]);
    for row in &rows {
        push_row(&mut md, row);
    }

    md.pop();
    md
}

fn push_row(md: &mut String, cells: &[String]) {
    md.push_str("| ");
    md.push_str(&cells.join(" | "));
    md.push_str(" |\n");
}

/// Flattened cell text, safe to sit between pipes.
fn cell_text(cell: &ElementRef<'_>) -> String {
    flat_text(cell).replace('|', "\\|")
}

fn flat_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

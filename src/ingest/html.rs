use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};

/// Every `<tr>` of every `<table>` in document order, one cell per `<th>`/`<td>`
/// holding its trimmed text. Rows without cells are skipped.
pub fn read_lines(text: &str) -> Result<Vec<Vec<String>>> {
    let row_sel = Selector::parse("table tr").map_err(|e| anyhow!("row selector: {:?}", e))?;
    let cell_sel = Selector::parse("th, td").map_err(|e| anyhow!("cell selector: {:?}", e))?;

    let doc = Html::parse_document(text);
    let lines = doc
        .select(&row_sel)
        .map(|tr| {
            tr.select(&cell_sel)
                .map(cell_text)
                .collect::<Vec<String>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();
    Ok(lines)
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

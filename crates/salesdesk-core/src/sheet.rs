//! Mapping of uploaded spreadsheet rows onto [`Product`] records.
//!
//! The upload path hands this module a header row plus data rows already
//! converted to strings; the file format (CSV, XLSX, ...) is the caller's
//! concern. Header matching ignores case, accents and surrounding spaces.
//! Columns that are absent fall back to defaults so a partial sheet still
//! produces one product per row.

use crate::models::{DiscontinuedRecord, Product, ProductStatus, RawDiscontinued};

/// Code assigned to rows whose sheet has no code column or an empty cell.
pub const DEFAULT_CODE: &str = "0";

const TABLE_HEADERS: &[&str] = &["tabela", "table", "linha"];
const UNIT_HEADERS: &[&str] = &["unidade", "unit"];
const SEGMENT_HEADERS: &[&str] = &["segmento", "segment"];
const CODE_HEADERS: &[&str] = &["codigo", "code", "codigo produto", "sku"];
const DESCRIPTION_HEADERS: &[&str] = &["descricao", "description", "produto"];
const PSD_HEADERS: &[&str] = &["psd", "valor tabela"];
const PSCF_HEADERS: &[&str] = &["pscf"];

/// Column positions recognized in a header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    table: Option<usize>,
    unit: Option<usize>,
    segment: Option<usize>,
    code: Option<usize>,
    description: Option<usize>,
    psd: Option<usize>,
    pscf: Option<usize>,
}

impl ColumnMap {
    pub fn from_headers<S: AsRef<str>>(headers: &[S]) -> Self {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| normalize_header(h.as_ref()))
            .collect();
        let find = |names: &[&str]| normalized.iter().position(|h| names.contains(&h.as_str()));

        Self {
            table: find(TABLE_HEADERS),
            unit: find(UNIT_HEADERS),
            segment: find(SEGMENT_HEADERS),
            code: find(CODE_HEADERS),
            description: find(DESCRIPTION_HEADERS),
            psd: find(PSD_HEADERS),
            pscf: find(PSCF_HEADERS),
        }
    }

    /// Number of product fields the header row provides.
    pub fn recognized(&self) -> usize {
        [
            self.table,
            self.unit,
            self.segment,
            self.code,
            self.description,
            self.psd,
            self.pscf,
        ]
        .iter()
        .filter(|c| c.is_some())
        .count()
    }

    /// Builds the product for one data row. `id` is 1-based.
    pub fn product(&self, row: &[String], id: u64) -> Product {
        let text = |col: Option<usize>| -> String {
            col.and_then(|i| row.get(i))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };
        let code = text(self.code);

        Product {
            id,
            table: text(self.table),
            unit: text(self.unit),
            segment: text(self.segment),
            code: if code.is_empty() {
                DEFAULT_CODE.to_string()
            } else {
                code
            },
            description: text(self.description),
            psd: parse_price(&text(self.psd)),
            pscf: parse_price(&text(self.pscf)),
            status: ProductStatus::InLine,
        }
    }
}

const DISC_CODE_HEADERS: &[&str] = &["codigo", "codigo produto", "code"];
const DISC_DESCRIPTION_HEADERS: &[&str] = &["descricao", "description"];
const DISC_REPLACEMENT_HEADERS: &[&str] = &["substituto", "substituto direto", "replacement"];
const DISC_ALTERNATIVE_HEADERS: &[&str] = &["indicacao", "alternative"];

/// Column positions of a discontinued-products export.
///
/// Cells are kept as text so codes with leading zeros survive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscontinuedColumns {
    code: Option<usize>,
    description: Option<usize>,
    replacement: Option<usize>,
    alternative: Option<usize>,
}

impl DiscontinuedColumns {
    pub fn from_headers<S: AsRef<str>>(headers: &[S]) -> Self {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| normalize_header(h.as_ref().trim_start_matches('\u{feff}')))
            .collect();
        let find = |names: &[&str]| normalized.iter().position(|h| names.contains(&h.as_str()));

        Self {
            code: find(DISC_CODE_HEADERS),
            description: find(DISC_DESCRIPTION_HEADERS),
            replacement: find(DISC_REPLACEMENT_HEADERS),
            alternative: find(DISC_ALTERNATIVE_HEADERS),
        }
    }

    /// The record for one row, or `None` when it has neither code nor
    /// description.
    pub fn record(&self, row: &[String]) -> Option<DiscontinuedRecord> {
        let cell = |col: Option<usize>| col.and_then(|i| row.get(i)).cloned();
        let raw = RawDiscontinued {
            code: cell(self.code).unwrap_or_default(),
            description: cell(self.description),
            replacement: cell(self.replacement),
            alternative: cell(self.alternative),
        };
        let record = raw.into_record();
        if record.code.is_empty() && record.description.is_empty() {
            None
        } else {
            Some(record)
        }
    }
}

/// Converts a header row and data rows into products, skipping blank rows.
pub fn products_from_rows<S: AsRef<str>>(headers: &[S], rows: &[Vec<String>]) -> Vec<Product> {
    let columns = ColumnMap::from_headers(headers);
    rows.iter()
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .enumerate()
        .map(|(i, row)| columns.product(row, i as u64 + 1))
        .collect()
}

/// Lowercases, trims and strips Portuguese diacritics from a header cell.
pub fn normalize_header(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            '_' => ' ',
            other => other,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses a price cell. Accepts `1234.5`, `1.234,50` and `R$ 10,00`.
/// Anything unparsable is `0.0`.
pub fn parse_price(raw: &str) -> f64 {
    let cleaned: String = raw
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return 0.0;
    }

    let has_comma = cleaned.contains(',');
    let has_dot = cleaned.contains('.');
    let canonical = match (has_comma, has_dot) {
        (true, true) => cleaned.replace('.', "").replace(',', "."),
        (true, false) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    canonical
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_normalize_header_strips_accents() {
        assert_eq!(normalize_header("  Descrição "), "descricao");
        assert_eq!(normalize_header("Código  Produto"), "codigo produto");
        assert_eq!(normalize_header("VALOR_TABELA"), "valor tabela");
    }

    #[test]
    fn test_full_header_mapping() {
        let headers = [
            "Tabela",
            "Unidade",
            "Segmento",
            "Código",
            "Descrição",
            "PSD",
            "PSCF",
        ];
        let rows = vec![row(&[
            "T1",
            "UN",
            "REDES",
            "4750021",
            "Roteador Wi-Fi",
            "199,90",
            "249.9",
        ])];
        let products = products_from_rows(&headers, &rows);
        assert_eq!(products.len(), 1);
        let p = &products[0];
        assert_eq!(p.id, 1);
        assert_eq!(p.table, "T1");
        assert_eq!(p.unit, "UN");
        assert_eq!(p.segment, "REDES");
        assert_eq!(p.code, "4750021");
        assert_eq!(p.description, "Roteador Wi-Fi");
        assert_eq!(p.psd, 199.9);
        assert_eq!(p.pscf, 249.9);
        assert_eq!(p.status, ProductStatus::InLine);
    }

    #[test]
    fn test_missing_columns_default_per_row() {
        let headers = ["Descrição", "Observação"];
        let rows = vec![
            row(&["Camera bullet", "x"]),
            row(&["Switch 8 portas", "y"]),
            row(&["NVR 16 canais"]),
        ];
        let products = products_from_rows(&headers, &rows);
        assert_eq!(products.len(), 3);
        for (i, p) in products.iter().enumerate() {
            assert_eq!(p.id, i as u64 + 1);
            assert_eq!(p.code, DEFAULT_CODE);
            assert_eq!(p.segment, "");
            assert_eq!(p.psd, 0.0);
            assert_eq!(p.pscf, 0.0);
        }
        assert_eq!(products[2].description, "NVR 16 canais");
    }

    #[test]
    fn test_blank_rows_are_skipped() {
        let headers = ["Código"];
        let rows = vec![row(&["1"]), row(&["", "  "]), row(&["2"])];
        let products = products_from_rows(&headers, &rows);
        let ids: Vec<(u64, &str)> = products.iter().map(|p| (p.id, p.code.as_str())).collect();
        assert_eq!(ids, vec![(1, "1"), (2, "2")]);
    }

    #[test]
    fn test_recognized_counts_known_columns() {
        let map = ColumnMap::from_headers(&["codigo", "foo", "PSD"]);
        assert_eq!(map.recognized(), 2);
    }

    #[test]
    fn test_discontinued_columns_keep_text_codes() {
        let cols = DiscontinuedColumns::from_headers(&[
            "\u{feff}Código Produto",
            "Descrição",
            "Substituto Direto",
            "Indicação",
        ]);
        let rec = cols.record(&row(&["0123", "Camera", "-", "0456"])).unwrap();
        assert_eq!(rec.code, "0123");
        assert_eq!(rec.replacement, None);
        assert_eq!(rec.alternative.as_deref(), Some("0456"));
        assert!(cols.record(&row(&["", " ", "x"])).is_none());
    }

    #[test]
    fn test_parse_price_formats() {
        assert_eq!(parse_price("1234.5"), 1234.5);
        assert_eq!(parse_price("1.234,50"), 1234.5);
        assert_eq!(parse_price("R$ 10,00"), 10.0);
        assert_eq!(parse_price(""), 0.0);
        assert_eq!(parse_price("consulte"), 0.0);
    }
}

use std::collections::HashMap;
use std::io::Read;

use csv::StringRecord;

use super::normalizer::{classify_header, Column};
use crate::workflows::premises::domain::{RawRecord, RowId};

/// Column positions resolved from the header row.
#[derive(Debug, Default)]
pub(crate) struct ColumnMap {
    positions: HashMap<Column, usize>,
}

impl ColumnMap {
    pub(crate) fn from_headers(headers: &StringRecord) -> Self {
        let mut positions = HashMap::new();
        for (index, header) in headers.iter().enumerate() {
            if let Some(column) = classify_header(header) {
                positions.entry(column).or_insert(index);
            }
        }
        Self { positions }
    }

    /// True when not even one address column was recognised.
    pub(crate) fn lacks_address_columns(&self) -> bool {
        ![Column::Address, Column::City, Column::State]
            .iter()
            .any(|column| self.positions.contains_key(column))
    }

    fn value(&self, record: &StringRecord, column: Column) -> String {
        self.positions
            .get(&column)
            .and_then(|&index| record.get(index))
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    }
}

pub(crate) struct ParsedInput {
    pub(crate) headers: Vec<String>,
    pub(crate) columns: ColumnMap,
    pub(crate) records: Vec<RawRecord>,
}

/// Reads every data row; ragged rows are padded with empty values.
pub(crate) fn parse_records<R: Read>(reader: R) -> Result<ParsedInput, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let header_row = csv_reader.headers()?.clone();
    let columns = ColumnMap::from_headers(&header_row);
    let mut records = Vec::new();

    for row in csv_reader.records() {
        let row = row?;
        if row.iter().all(|value| value.trim().is_empty()) {
            continue;
        }

        let line = row.position().map(|position| position.line()).unwrap_or(0);
        records.push(RawRecord {
            row_id: RowId(line),
            business_name: columns.value(&row, Column::Name),
            business_type: columns.value(&row, Column::BusinessType),
            address_line: columns.value(&row, Column::Address),
            city: columns.value(&row, Column::City),
            state_code: columns.value(&row, Column::State),
            postal_code: columns.value(&row, Column::PostalCode),
        });
    }

    Ok(ParsedInput {
        headers: header_row.iter().map(str::to_string).collect(),
        columns,
        records,
    })
}

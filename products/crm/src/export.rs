use std::borrow::Cow;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use async_trait::async_trait;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use thiserror::Error;
use tracing::info;

use crate::model::{
    Company, CompanyRef, Contact, Deal, NO_COMPANY, NO_CONTACT, UNKNOWN_COMPANY, UNKNOWN_CONTACT,
    company_name, contact_name,
};

pub const DEAL_EXPORT_HEADERS: [&str; 9] = [
    "Id",
    "name",
    "value",
    "stage",
    "contact",
    "company",
    "description",
    "createdAt",
    "expectedCloseDate",
];

pub const CSV_MEDIA_TYPE: &str = "text/csv;charset=utf-8";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv buffer could not be finalized: {0}")]
    Buffer(String),
    #[error("export delivery failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A finished export, ready to hand to a delivery target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportFile {
    pub filename: String,
    pub media_type: &'static str,
    pub contents: String,
}

impl ExportFile {
    pub fn bytes(&self) -> &[u8] {
        self.contents.as_bytes()
    }
}

pub fn export_filename(date: NaiveDate) -> String {
    format!("deals_export_{}.csv", date.format("%Y-%m-%d"))
}

/// Short US calendar date, e.g. `3/7/2025`.
pub fn short_date(date: NaiveDate) -> String {
    date.format("%-m/%-d/%Y").to_string()
}

fn contact_column(deal: &Deal, contacts: &[Contact]) -> String {
    match deal.contact_id {
        None => NO_CONTACT.to_string(),
        Some(id) => contact_name(contacts, id)
            .unwrap_or(UNKNOWN_CONTACT)
            .to_string(),
    }
}

fn company_column(deal: &Deal, companies: &[Company]) -> String {
    match &deal.company_id {
        CompanyRef::Unresolved => NO_COMPANY.to_string(),
        CompanyRef::Name(name) => name.clone(),
        CompanyRef::Id(id) => company_name(companies, *id)
            .unwrap_or(UNKNOWN_COMPANY)
            .to_string(),
    }
}

fn deal_record(deal: &Deal, contacts: &[Contact], companies: &[Company]) -> [String; 9] {
    [
        deal.id.to_string(),
        deal.name.clone(),
        deal.value.to_string(),
        deal.stage.as_str().to_string(),
        contact_column(deal, contacts),
        company_column(deal, companies),
        deal.notes.clone().unwrap_or_default(),
        short_date(deal.created_at.date_naive()),
        short_date(deal.expected_close_date),
    ]
}

/// Quotes a field only when it holds a comma, a double quote or a newline.
/// A lone `\r` is written as is.
fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Encodes deals as CSV. Records are separated by `\n` with no newline after
/// the last row; an empty slice yields the header row followed by `\n`.
pub fn encode_deals(
    deals: &[Deal],
    contacts: &[Contact],
    companies: &[Company],
) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(DEAL_EXPORT_HEADERS)?;
    for deal in deals {
        let record = deal_record(deal, contacts, companies);
        writer.write_record(record.iter().map(|field| escape_field(field).into_owned()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Buffer(err.to_string()))?;
    let mut csv = String::from_utf8(bytes).map_err(|err| ExportError::Buffer(err.to_string()))?;
    if !deals.is_empty() {
        csv.pop();
    }
    Ok(csv)
}

pub fn build_export(
    deals: &[Deal],
    contacts: &[Contact],
    companies: &[Company],
    export_date: NaiveDate,
) -> Result<ExportFile, ExportError> {
    Ok(ExportFile {
        filename: export_filename(export_date),
        media_type: CSV_MEDIA_TYPE,
        contents: encode_deals(deals, contacts, companies)?,
    })
}

/// Where a finished export goes. The browser build hands the bytes to a
/// download link; the CLI writes them to disk.
#[async_trait]
pub trait ExportDelivery: Send + Sync {
    async fn deliver(&self, file: &ExportFile) -> Result<(), ExportError>;
}

/// Saves exports into a directory under their generated filename.
#[derive(Clone, Debug)]
pub struct DirectoryDelivery {
    dir: PathBuf,
}

impl DirectoryDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn target_for(&self, file: &ExportFile) -> PathBuf {
        self.dir.join(&file.filename)
    }
}

#[async_trait]
impl ExportDelivery for DirectoryDelivery {
    async fn deliver(&self, file: &ExportFile) -> Result<(), ExportError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.target_for(file);
        tokio::fs::write(&target, file.bytes()).await?;
        info!(path = %target.display(), bytes = file.contents.len(), "deal export written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Stage;
    use chrono::{TimeZone, Utc};

    fn deal(id: i64, name: &str, value: f64) -> Deal {
        let created = Utc.with_ymd_and_hms(2025, 3, 7, 15, 30, 0).unwrap();
        Deal {
            id,
            name: name.into(),
            value,
            stage: Stage::Negotiation,
            expected_close_date: NaiveDate::from_ymd_opt(2025, 11, 20).unwrap(),
            contact_id: Some(1),
            company_id: CompanyRef::Id(1),
            notes: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn lookups() -> (Vec<Contact>, Vec<Company>) {
        (
            vec![Contact {
                id: 1,
                name: "Ada Lovelace".into(),
                email: None,
                company_id: Some(1),
            }],
            vec![Company {
                id: 1,
                name: "Acme".into(),
            }],
        )
    }

    #[test]
    fn empty_collection_yields_header_only() {
        let csv = encode_deals(&[], &[], &[]).unwrap();
        assert_eq!(
            csv,
            "Id,name,value,stage,contact,company,description,createdAt,expectedCloseDate\n"
        );
    }

    #[test]
    fn row_layout_and_date_format() {
        let (contacts, companies) = lookups();
        let csv = encode_deals(&[deal(1, "Acme", 5000.0)], &contacts, &companies).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(row, "1,Acme,5000,Negotiation,Ada Lovelace,Acme,,3/7/2025,11/20/2025");
    }

    #[test]
    fn fields_with_separators_are_quoted() {
        let (contacts, companies) = lookups();
        let mut d = deal(2, "Plain", 12000.5);
        d.notes = Some(r#"Contains, a comma and a "quote""#.into());
        let csv = encode_deals(&[d], &contacts, &companies).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert!(row.contains(r#","Contains, a comma and a ""quote""","#), "{row}");
        assert!(row.starts_with("2,Plain,12000.5,"));

        let mut multiline = deal(3, "two\nlines", 1.0);
        multiline.notes = Some("no separators here".into());
        let csv = encode_deals(&[multiline], &contacts, &companies).unwrap();
        assert!(csv.contains("3,\"two\nlines\",1,"));
        assert!(csv.contains(",no separators here,"));
    }

    #[test]
    fn placeholders_for_missing_references() {
        let (contacts, companies) = lookups();
        let mut absent = deal(1, "a", 1.0);
        absent.contact_id = None;
        absent.company_id = CompanyRef::Unresolved;
        let mut dangling = deal(2, "b", 1.0);
        dangling.contact_id = Some(77);
        dangling.company_id = CompanyRef::Id(88);
        let mut named = deal(3, "c", 1.0);
        named.company_id = CompanyRef::Name("Globex".into());

        let csv = encode_deals(&[absent, dangling, named], &contacts, &companies).unwrap();
        let rows: Vec<&str> = csv.lines().skip(1).collect();
        assert!(rows[0].contains(",No Contact,No Company,"));
        assert!(rows[1].contains(",Unknown Contact,Unknown Company,"));
        assert!(rows[2].contains(",Ada Lovelace,Globex,"));
    }

    #[test]
    fn last_row_has_no_trailing_newline() {
        let (contacts, companies) = lookups();
        let csv = encode_deals(
            &[deal(1, "Acme", 5000.0), deal(2, "Globex", 7.5)],
            &contacts,
            &companies,
        )
        .unwrap();
        assert!(!csv.ends_with('\n'), "{csv:?}");
        assert_eq!(csv.matches('\n').count(), 2);
        assert!(csv.ends_with(",3/7/2025,11/20/2025"));
    }

    #[test]
    fn carriage_return_alone_is_not_quoted() {
        let (contacts, companies) = lookups();
        let mut d = deal(4, "a\rb", 1.0);
        d.notes = Some("line\nbreak".into());
        let csv = encode_deals(&[d], &contacts, &companies).unwrap();
        assert!(csv.contains("\n4,a\rb,1,"), "{csv:?}");
        assert!(csv.contains(",\"line\nbreak\","));
    }

    #[test]
    fn filename_uses_iso_export_date() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 9).unwrap();
        assert_eq!(export_filename(date), "deals_export_2025-01-09.csv");
    }

    #[tokio::test]
    async fn directory_delivery_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let delivery = DirectoryDelivery::new(dir.path().join("exports"));
        let date = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        let file = build_export(&[], &[], &[], date).unwrap();
        delivery.deliver(&file).await.unwrap();
        let written = std::fs::read_to_string(delivery.target_for(&file)).unwrap();
        assert_eq!(written, file.contents);
        assert_eq!(file.media_type, CSV_MEDIA_TYPE);
    }
}

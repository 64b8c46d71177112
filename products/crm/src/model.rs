use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

pub type DealId = i64;
pub type ContactId = i64;
pub type CompanyId = i64;

pub const UNKNOWN_CONTACT: &str = "Unknown Contact";
pub const NO_CONTACT: &str = "No Contact";
pub const UNKNOWN_COMPANY: &str = "Unknown Company";
pub const NO_COMPANY: &str = "No Company";

/// Pipeline stage of a deal. The declaration order is the board's column order.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[default]
    Prospecting,
    Proposal,
    Negotiation,
    #[serde(rename = "Closed Won")]
    ClosedWon,
    #[serde(rename = "Closed Lost")]
    ClosedLost,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Prospecting,
        Stage::Proposal,
        Stage::Negotiation,
        Stage::ClosedWon,
        Stage::ClosedLost,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Prospecting => "Prospecting",
            Stage::Proposal => "Proposal",
            Stage::Negotiation => "Negotiation",
            Stage::ClosedWon => "Closed Won",
            Stage::ClosedLost => "Closed Lost",
        }
    }

    /// Exact match against the display label, as used for bucket identifiers.
    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "Prospecting" => Some(Stage::Prospecting),
            "Proposal" => Some(Stage::Proposal),
            "Negotiation" => Some(Stage::Negotiation),
            "Closed Won" => Some(Stage::ClosedWon),
            "Closed Lost" => Some(Stage::ClosedLost),
            _ => None,
        }
    }

    pub fn position(self) -> usize {
        match self {
            Stage::Prospecting => 0,
            Stage::Proposal => 1,
            Stage::Negotiation => 2,
            Stage::ClosedWon => 3,
            Stage::ClosedLost => 4,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown stage {0:?}")]
pub struct UnknownStage(pub String);

/// Lenient parse for typed input: case, spaces, dashes and underscores are ignored,
/// so `closed-won`, `CLOSED_WON` and `Closed Won` are the same stage.
impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().replace(' ', "").to_lowercase() == key)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// Reference from a deal to its company.
///
/// Records reach us with the company stored as a numeric id, an id string, a
/// lookup object (`{ "Id": 3, "Name": "Acme" }`) or a bare name. All of them
/// collapse into this shape through [`CompanyRef::normalize`].
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CompanyRef {
    Id(CompanyId),
    Name(String),
    #[default]
    Unresolved,
}

impl CompanyRef {
    pub fn normalize(raw: &Value) -> Self {
        match raw {
            Value::Number(n) => n.as_i64().map(CompanyRef::Id).unwrap_or_default(),
            Value::String(s) => Self::from_text(s),
            Value::Object(map) => {
                if let Some(id) = map.get("Id").or_else(|| map.get("id")) {
                    match Self::normalize(id) {
                        CompanyRef::Id(id) => return CompanyRef::Id(id),
                        CompanyRef::Name(_) | CompanyRef::Unresolved => {}
                    }
                }
                match map.get("Name").or_else(|| map.get("name")) {
                    Some(Value::String(name)) => Self::from_text(name),
                    _ => CompanyRef::Unresolved,
                }
            }
            _ => CompanyRef::Unresolved,
        }
    }

    fn from_text(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            CompanyRef::Unresolved
        } else if let Ok(id) = trimmed.parse::<CompanyId>() {
            CompanyRef::Id(id)
        } else {
            CompanyRef::Name(trimmed.to_string())
        }
    }

    pub fn id(&self) -> Option<CompanyId> {
        match self {
            CompanyRef::Id(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, CompanyRef::Unresolved)
    }

    /// String form used when comparing against a company filter value.
    pub fn filter_key(&self) -> Option<String> {
        match self {
            CompanyRef::Id(id) => Some(id.to_string()),
            CompanyRef::Name(name) => Some(name.clone()),
            CompanyRef::Unresolved => None,
        }
    }

    /// Resolved display name, if the reference points at something nameable.
    pub fn display_name<'a>(&'a self, companies: &'a [Company]) -> Option<&'a str> {
        match self {
            CompanyRef::Id(id) => company_name(companies, *id),
            CompanyRef::Name(name) => Some(name.as_str()),
            CompanyRef::Unresolved => None,
        }
    }
}

impl From<Option<CompanyId>> for CompanyRef {
    fn from(value: Option<CompanyId>) -> Self {
        value.map(CompanyRef::Id).unwrap_or_default()
    }
}

impl Serialize for CompanyRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CompanyRef::Id(id) => serializer.serialize_i64(*id),
            CompanyRef::Name(name) => serializer.serialize_str(name),
            CompanyRef::Unresolved => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for CompanyRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(CompanyRef::normalize(&raw))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    #[serde(rename = "Id")]
    pub id: DealId,
    pub name: String,
    #[serde(deserialize_with = "deserialize_amount")]
    pub value: f64,
    pub stage: Stage,
    pub expected_close_date: NaiveDate,
    /// Always set for deals that went through the form validator.
    #[serde(default)]
    pub contact_id: Option<ContactId>,
    #[serde(default)]
    pub company_id: CompanyRef,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    /// Card label for the contact; a dangling reference never fails rendering.
    pub fn contact_label<'a>(&self, contacts: &'a [Contact]) -> &'a str {
        self.contact_id
            .and_then(|id| contact_name(contacts, id))
            .unwrap_or(UNKNOWN_CONTACT)
    }

    pub fn company_label<'a>(&'a self, companies: &'a [Company]) -> &'a str {
        self.company_id.display_name(companies).unwrap_or(NO_COMPANY)
    }

    pub(crate) fn apply(&mut self, payload: DealPayload, now: DateTime<Utc>) {
        self.name = payload.name;
        self.value = payload.value;
        self.stage = payload.stage;
        self.expected_close_date = payload.expected_close_date;
        self.contact_id = Some(payload.contact_id);
        self.company_id = payload.company_id.into();
        self.notes = payload.notes;
        self.updated_at = now;
    }
}

/// Canonical, validated input for creating or editing a deal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealPayload {
    pub name: String,
    pub value: f64,
    pub stage: Stage,
    pub expected_close_date: NaiveDate,
    pub contact_id: ContactId,
    pub company_id: Option<CompanyId>,
    pub notes: Option<String>,
}

impl DealPayload {
    pub fn into_deal(self, id: DealId, now: DateTime<Utc>) -> Deal {
        Deal {
            id,
            name: self.name,
            value: self.value,
            stage: self.stage,
            expected_close_date: self.expected_close_date,
            contact_id: Some(self.contact_id),
            company_id: self.company_id.into(),
            notes: self.notes,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(rename = "Id")]
    pub id: ContactId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company_id: Option<CompanyId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Company {
    #[serde(rename = "Id")]
    pub id: CompanyId,
    #[serde(alias = "Name")]
    pub name: String,
}

pub fn contact_name(contacts: &[Contact], id: ContactId) -> Option<&str> {
    contacts
        .iter()
        .find(|contact| contact.id == id)
        .map(|contact| contact.name.as_str())
}

pub fn company_name(companies: &[Company], id: CompanyId) -> Option<&str> {
    companies
        .iter()
        .find(|company| company.id == id)
        .map(|company| company.name.as_str())
}

/// Numeric reading of a raw amount; anything that is not a finite number is 0.
pub fn parse_amount(raw: &Value) -> f64 {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn deserialize_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    Ok(parse_amount(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn company_ref_normalizes_every_input_shape() {
        assert_eq!(CompanyRef::normalize(&json!(4)), CompanyRef::Id(4));
        assert_eq!(CompanyRef::normalize(&json!("4")), CompanyRef::Id(4));
        assert_eq!(
            CompanyRef::normalize(&json!({ "Id": 9, "Name": "Globex" })),
            CompanyRef::Id(9)
        );
        assert_eq!(
            CompanyRef::normalize(&json!({ "Name": "Globex" })),
            CompanyRef::Name("Globex".into())
        );
        assert_eq!(
            CompanyRef::normalize(&json!("Initech")),
            CompanyRef::Name("Initech".into())
        );
        assert_eq!(CompanyRef::normalize(&json!(null)), CompanyRef::Unresolved);
        assert_eq!(CompanyRef::normalize(&json!("  ")), CompanyRef::Unresolved);
    }

    #[test]
    fn deal_deserializes_loose_records() {
        let deal: Deal = serde_json::from_value(json!({
            "Id": 3,
            "name": "Umbrella renewal",
            "value": "4500.50",
            "stage": "Closed Won",
            "expectedCloseDate": "2025-06-30",
            "contactId": 2,
            "companyId": { "Id": 7, "Name": "Umbrella" },
            "createdAt": "2025-01-10T09:00:00Z",
            "updatedAt": "2025-01-11T09:00:00Z"
        }))
        .unwrap();
        assert_eq!(deal.value, 4500.5);
        assert_eq!(deal.stage, Stage::ClosedWon);
        assert_eq!(deal.company_id, CompanyRef::Id(7));
        assert_eq!(deal.notes, None);
    }

    #[test]
    fn garbage_amounts_read_as_zero() {
        assert_eq!(parse_amount(&json!("n/a")), 0.0);
        assert_eq!(parse_amount(&json!(null)), 0.0);
        assert_eq!(parse_amount(&json!(12)), 12.0);
    }

    #[test]
    fn stage_parsing_is_lenient_for_typed_input() {
        assert_eq!("closed-won".parse::<Stage>().unwrap(), Stage::ClosedWon);
        assert_eq!("NEGOTIATION".parse::<Stage>().unwrap(), Stage::Negotiation);
        assert!("won".parse::<Stage>().is_err());
        assert_eq!(Stage::from_label("closed won"), None);
    }

    #[test]
    fn labels_fall_back_to_placeholders() {
        let companies = vec![Company { id: 1, name: "Acme".into() }];
        let contacts = vec![Contact {
            id: 5,
            name: "Ada".into(),
            email: None,
            company_id: Some(1),
        }];
        let mut deal = Deal {
            id: 1,
            name: "Acme".into(),
            value: 10.0,
            stage: Stage::Proposal,
            expected_close_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            contact_id: Some(5),
            company_id: CompanyRef::Id(1),
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(deal.contact_label(&contacts), "Ada");
        assert_eq!(deal.company_label(&companies), "Acme");
        deal.contact_id = Some(99);
        deal.company_id = CompanyRef::Id(42);
        assert_eq!(deal.contact_label(&contacts), UNKNOWN_CONTACT);
        assert_eq!(deal.company_label(&companies), NO_COMPANY);
    }
}

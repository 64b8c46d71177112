use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Company, CompanyId, CompanyRef, Contact, ContactId, Deal, DealPayload, Stage};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DealField {
    Name,
    Value,
    Stage,
    ExpectedCloseDate,
    ContactId,
    CompanyId,
}

impl DealField {
    pub fn as_str(self) -> &'static str {
        match self {
            DealField::Name => "name",
            DealField::Value => "value",
            DealField::Stage => "stage",
            DealField::ExpectedCloseDate => "expectedCloseDate",
            DealField::ContactId => "contactId",
            DealField::CompanyId => "companyId",
        }
    }
}

impl fmt::Display for DealField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failing field with its message. Never empty when returned as an error.
#[derive(Clone, Debug, Default, PartialEq, Eq, Error)]
#[error("deal form has {} invalid field(s)", .0.len())]
pub struct ValidationErrors(BTreeMap<DealField, String>);

impl ValidationErrors {
    fn add(&mut self, field: DealField, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    pub fn get(&self, field: DealField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: DealField) -> bool {
        self.0.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DealField, &str)> {
        self.0.iter().map(|(field, message)| (*field, message.as_str()))
    }
}

/// Deal form as typed by the user. Every field is raw text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DealForm {
    pub name: String,
    pub value: String,
    pub stage: String,
    pub expected_close_date: String,
    pub contact_id: String,
    pub company_id: String,
    pub notes: String,
}

impl Default for DealForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            value: String::new(),
            stage: Stage::default().as_str().to_string(),
            expected_close_date: String::new(),
            contact_id: String::new(),
            company_id: String::new(),
            notes: String::new(),
        }
    }
}

impl DealForm {
    /// Prefills the form from an existing deal for editing. A company stored
    /// by name is prefilled as that name, which fails validation until an id
    /// is chosen; use [`DealForm::for_edit`] to resolve it first.
    pub fn from_deal(deal: &Deal) -> Self {
        Self {
            name: deal.name.clone(),
            value: deal.value.to_string(),
            stage: deal.stage.as_str().to_string(),
            expected_close_date: deal.expected_close_date.format("%Y-%m-%d").to_string(),
            contact_id: deal.contact_id.map(|id| id.to_string()).unwrap_or_default(),
            company_id: deal.company_id.filter_key().unwrap_or_default(),
            notes: deal.notes.clone().unwrap_or_default(),
        }
    }

    /// Like [`DealForm::from_deal`], but a company stored by name is matched
    /// (case-insensitively) against `companies` and prefilled with its id.
    pub fn for_edit(deal: &Deal, companies: &[Company]) -> Self {
        let mut form = Self::from_deal(deal);
        if let CompanyRef::Name(name) = &deal.company_id {
            if let Some(company) = companies
                .iter()
                .find(|company| company.name.trim().eq_ignore_ascii_case(name.trim()))
            {
                form.company_id = company.id.to_string();
            }
        }
        form
    }

    /// Checks every rule against `today` and either returns the canonical
    /// payload or all field errors at once.
    pub fn validate(&self, today: NaiveDate) -> Result<DealPayload, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let name = self.name.trim();
        if name.is_empty() {
            errors.add(DealField::Name, "Deal name is required");
        }

        let value = self.value.trim();
        let amount = if value.is_empty() {
            errors.add(DealField::Value, "Deal value is required");
            None
        } else {
            match value.parse::<f64>() {
                Ok(amount) if amount.is_finite() && amount > 0.0 => Some(amount),
                _ => {
                    errors.add(DealField::Value, "Deal value must be a positive number");
                    None
                }
            }
        };

        let stage = self.stage.trim();
        let stage = if stage.is_empty() {
            errors.add(DealField::Stage, "Stage is required");
            None
        } else {
            let parsed = Stage::from_label(stage);
            if parsed.is_none() {
                errors.add(DealField::Stage, "Stage must be one of the pipeline stages");
            }
            parsed
        };

        let close = self.expected_close_date.trim();
        let expected_close_date = if close.is_empty() {
            errors.add(DealField::ExpectedCloseDate, "Expected close date is required");
            None
        } else {
            match NaiveDate::parse_from_str(close, "%Y-%m-%d") {
                Ok(date) if date < today => {
                    errors.add(
                        DealField::ExpectedCloseDate,
                        "Expected close date cannot be in the past",
                    );
                    None
                }
                Ok(date) => Some(date),
                Err(_) => {
                    errors.add(DealField::ExpectedCloseDate, "Expected close date is invalid");
                    None
                }
            }
        };

        let contact = self.contact_id.trim();
        let contact_id = if contact.is_empty() {
            errors.add(DealField::ContactId, "Contact is required");
            None
        } else {
            let parsed = contact.parse::<ContactId>().ok();
            if parsed.is_none() {
                errors.add(DealField::ContactId, "Contact reference is invalid");
            }
            parsed
        };

        let company = self.company_id.trim();
        let company_id = if company.is_empty() {
            None
        } else {
            let parsed = company.parse::<CompanyId>().ok();
            if parsed.is_none() {
                errors.add(DealField::CompanyId, "Company reference is invalid");
            }
            parsed
        };

        match (amount, stage, expected_close_date, contact_id) {
            (Some(value), Some(stage), Some(expected_close_date), Some(contact_id))
                if errors.is_empty() =>
            {
                let notes = self.notes.trim();
                Ok(DealPayload {
                    name: name.to_string(),
                    value,
                    stage,
                    expected_close_date,
                    contact_id,
                    company_id,
                    notes: (!notes.is_empty()).then(|| notes.to_string()),
                })
            }
            _ => Err(errors),
        }
    }
}

/// Contacts offered for the selected company; every contact when none is chosen.
pub fn contacts_for_company<'a>(contacts: &'a [Contact], company_id: &str) -> Vec<&'a Contact> {
    let company_id = company_id.trim();
    if company_id.is_empty() {
        return contacts.iter().collect();
    }
    contacts
        .iter()
        .filter(|contact| {
            contact
                .company_id
                .map(|id| id.to_string() == company_id)
                .unwrap_or(false)
        })
        .collect()
}

//! New-patient intake form.
//!
//! Submissions are mapped onto the field names of the clinic's fillable
//! intake template and written out as one timestamped JSON document per
//! patient, named after the patient.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::services::reviews::sanitize_filename;

const SEX: &[(&str, &str)] = &[("Male", "1"), ("Female", "2")];
const YES_NO: &[(&str, &str)] = &[("Yes", "1"), ("No", "2")];
const MARITAL: &[(&str, &str)] = &[
    ("Single", "1"),
    ("Married", "2"),
    ("Divorced", "3"),
    ("Separated", "4"),
    ("Widowed", "5"),
];
const SUBSCRIBER_RELATION: &[(&str, &str)] =
    &[("Self", "1"), ("Spouse", "2"), ("Child", "3"), ("Other", "4")];

const SIGNATURE_DATE_FORMAT: &str = "%m/%d/%y";

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("{0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for IntakeError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for IntakeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Intake form as posted by the website. Field names follow the HTML form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewPatientForm {
    pub p_first: String,
    pub p_last: String,
    pub p_mi: String,
    pub p_address: String,
    pub p_city: String,
    pub p_state: String,
    pub p_zip: String,
    pub p_cell_phone: String,
    pub p_alt_phone: String,
    pub p_dob: String,
    pub p_email: String,
    pub p_sex: String,
    pub p_marital: String,

    pub m_meds: String,
    pub m_allergies: String,
    pub m_serious: String,
    pub m_phenfen: String,
    pub m_conditions: Vec<String>,

    pub w_pregnant: String,
    pub w_ocp: String,
    pub w_nursing: String,

    pub pi_subscriber: String,
    pub pi_member_id: String,
    pub pi_group: String,
    pub pi_dob: String,
    pub pi_company: String,
    pub pi_rel: String,

    pub sig_med: String,
    pub sig_med_date: String,
    pub sig_ins_name: String,
    pub sig_ins: String,
    pub sig_ins_date: String,

    pub agree: bool,
}

/// What gets written for one submission.
#[derive(Debug, Serialize)]
struct IntakeRecord<'a> {
    submitted_at: String,
    fields: &'a BTreeMap<String, String>,
}

fn condition_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("Invalid regex"))
}

fn lookup(table: &[(&str, &str)], answer: &str) -> Option<String> {
    table
        .iter()
        .find(|(label, _)| *label == answer)
        .map(|(_, code)| (*code).to_string())
}

/// Validates the form and maps it to template field names. Blank values are
/// left out; signature dates default to `today`.
pub fn map_fields(
    form: &NewPatientForm,
    today: DateTime<Utc>,
) -> Result<BTreeMap<String, String>, IntakeError> {
    let first = form.p_first.trim();
    let last = form.p_last.trim();
    if first.is_empty() || last.is_empty() {
        return Err(IntakeError::Validation(
            "Patient first and last name are required.".to_string(),
        ));
    }
    if form.sig_med.trim().is_empty() {
        return Err(IntakeError::Validation(
            "Medical signature is required.".to_string(),
        ));
    }
    if !form.agree {
        return Err(IntakeError::Validation(
            "You must agree to the policy to submit.".to_string(),
        ));
    }

    let today = today.format(SIGNATURE_DATE_FORMAT).to_string();
    let or_today = |value: &str| {
        let value = value.trim();
        if value.is_empty() {
            today.clone()
        } else {
            value.to_string()
        }
    };

    let text_fields = [
        ("pt-firstname", first.to_string()),
        ("pt-lastname", last.to_string()),
        ("pt-midname", form.p_mi.trim().to_string()),
        ("pt-address", form.p_address.trim().to_string()),
        ("pt-city", form.p_city.trim().to_string()),
        ("pt-state", form.p_state.trim().to_string()),
        ("pt-zipcode", form.p_zip.trim().to_string()),
        ("pt-cellphone", form.p_cell_phone.trim().to_string()),
        ("pt-alt-phone", form.p_alt_phone.trim().to_string()),
        ("pt-dob", form.p_dob.trim().to_string()),
        ("pt-email", form.p_email.trim().to_string()),
        ("pt-medications", form.m_meds.trim().to_string()),
        ("pt-allergies", form.m_allergies.trim().to_string()),
        ("pt-med-sig", form.sig_med.trim().to_string()),
        ("pt-med-date", or_today(&form.sig_med_date)),
        ("sub-name", form.pi_subscriber.trim().to_string()),
        ("sub-ID", form.pi_member_id.trim().to_string()),
        ("sub-group", form.pi_group.trim().to_string()),
        ("sub-dob", form.pi_dob.trim().to_string()),
        ("sub-ins-name", form.pi_company.trim().to_string()),
        ("sub-sig-name", form.sig_ins_name.trim().to_string()),
        ("sub-signature", form.sig_ins.trim().to_string()),
        ("sub-sig-date", or_today(&form.sig_ins_date)),
    ];

    let choices = [
        ("sex", lookup(SEX, &form.p_sex)),
        ("marital-status", lookup(MARITAL, &form.p_marital)),
        ("sub-relationship", lookup(SUBSCRIBER_RELATION, &form.pi_rel)),
        ("serious-illness", lookup(YES_NO, &form.m_serious)),
        ("phen-fen", lookup(YES_NO, &form.m_phenfen)),
        ("pregnant", lookup(YES_NO, &form.w_pregnant)),
        ("contraceptives", lookup(YES_NO, &form.w_ocp)),
        ("nursing", lookup(YES_NO, &form.w_nursing)),
    ];

    let mut fields: BTreeMap<String, String> = text_fields
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| (name.to_string(), value))
        .collect();

    for (name, code) in choices {
        if let Some(code) = code {
            fields.insert(name.to_string(), code);
        }
    }

    // Checkbox names become field names, so they may not shadow another field.
    for condition in &form.m_conditions {
        let condition = condition.trim();
        if condition_name().is_match(condition) && !fields.contains_key(condition) {
            fields.insert(condition.to_string(), "Yes".to_string());
        }
    }

    Ok(fields)
}

/// Output file stem for a patient, e.g. `Doe_Jane`.
#[must_use]
pub fn output_stem(first: &str, last: &str) -> String {
    let safe = sanitize_filename(&format!("{}_{}", last.trim(), first.trim()));
    if safe.is_empty() {
        "patient".to_string()
    } else {
        safe
    }
}

pub struct IntakeService {
    dir: PathBuf,
}

impl IntakeService {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn submit(&self, form: &NewPatientForm) -> Result<String, IntakeError> {
        self.submit_at(form, Utc::now()).await
    }

    /// Validates, maps and stores one form. Returns the file name written.
    pub async fn submit_at(
        &self,
        form: &NewPatientForm,
        now: DateTime<Utc>,
    ) -> Result<String, IntakeError> {
        let fields = map_fields(form, now)?;
        let record = IntakeRecord {
            submitted_at: now.to_rfc3339(),
            fields: &fields,
        };
        let body = serde_json::to_vec_pretty(&record)?;

        tokio::fs::create_dir_all(&self.dir).await?;

        let stem = format!(
            "{}_{}",
            output_stem(&form.p_first, &form.p_last),
            now.format("%Y%m%d_%H%M%S")
        );
        for attempt in 1u32..=100 {
            let name = if attempt == 1 {
                format!("{stem}.json")
            } else {
                format!("{stem}-{attempt}.json")
            };

            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.dir.join(&name))
                .await;

            match opened {
                Ok(mut file) => {
                    file.write_all(&body).await?;
                    file.flush().await?;
                    tracing::info!(file = %name, fields = fields.len(), "New patient form stored");
                    return Ok(name);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
        }

        Err(IntakeError::Internal("No free file name".to_string()))
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn today() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 9, 14, 30, 5).unwrap()
    }

    fn minimal_form() -> NewPatientForm {
        NewPatientForm {
            p_first: " Jane ".to_string(),
            p_last: "Doe".to_string(),
            sig_med: "Jane Doe".to_string(),
            agree: true,
            ..NewPatientForm::default()
        }
    }

    #[test]
    fn test_required_fields() {
        let mut form = minimal_form();
        form.p_last = "  ".to_string();
        let err = map_fields(&form, today()).unwrap_err();
        assert_eq!(err.to_string(), "Patient first and last name are required.");

        let mut form = minimal_form();
        form.sig_med.clear();
        let err = map_fields(&form, today()).unwrap_err();
        assert_eq!(err.to_string(), "Medical signature is required.");

        let mut form = minimal_form();
        form.agree = false;
        let err = map_fields(&form, today()).unwrap_err();
        assert_eq!(err.to_string(), "You must agree to the policy to submit.");
    }

    #[test]
    fn test_blank_fields_dropped_and_dates_defaulted() {
        let fields = map_fields(&minimal_form(), today()).unwrap();

        assert_eq!(fields["pt-firstname"], "Jane");
        assert_eq!(fields["pt-lastname"], "Doe");
        assert_eq!(fields["pt-med-sig"], "Jane Doe");
        assert_eq!(fields["pt-med-date"], "03/09/26");
        assert_eq!(fields["sub-sig-date"], "03/09/26");
        assert!(!fields.contains_key("pt-email"));
        assert!(!fields.contains_key("sex"));
        assert_eq!(fields.len(), 5);
    }

    #[test]
    fn test_choices_and_conditions_mapped() {
        let form = NewPatientForm {
            p_sex: "Female".to_string(),
            p_marital: "Widowed".to_string(),
            pi_rel: "Spouse".to_string(),
            m_serious: "No".to_string(),
            w_pregnant: "Yes".to_string(),
            w_ocp: "maybe".to_string(),
            sig_med_date: "01/02/26".to_string(),
            m_conditions: vec![
                "diabetes".to_string(),
                "heart-disease".to_string(),
                "pt-firstname".to_string(),
                "../etc".to_string(),
            ],
            ..minimal_form()
        };
        let fields = map_fields(&form, today()).unwrap();

        assert_eq!(fields["sex"], "2");
        assert_eq!(fields["marital-status"], "5");
        assert_eq!(fields["sub-relationship"], "2");
        assert_eq!(fields["serious-illness"], "2");
        assert_eq!(fields["pregnant"], "1");
        assert!(!fields.contains_key("contraceptives"));
        assert_eq!(fields["pt-med-date"], "01/02/26");
        assert_eq!(fields["diabetes"], "Yes");
        assert_eq!(fields["heart-disease"], "Yes");
        assert_eq!(fields["pt-firstname"], "Jane");
        assert!(!fields.contains_key("../etc"));
    }

    #[test]
    fn test_output_stem() {
        assert_eq!(output_stem("Jane", "Doe"), "Doe_Jane");
        assert_eq!(output_stem("Mary Ann", "O'Neil/../x"), "x_Mary_Ann");
        assert_eq!(output_stem("", "../"), "patient");
    }

    #[tokio::test]
    async fn test_submit_writes_timestamped_file() {
        let dir = std::env::temp_dir().join(format!("clinic-intake-{}", uuid::Uuid::new_v4()));
        let service = IntakeService::new(&dir);

        let first = service.submit_at(&minimal_form(), today()).await.unwrap();
        let second = service.submit_at(&minimal_form(), today()).await.unwrap();
        assert_eq!(first, "Doe_Jane_20260309_143005.json");
        assert_eq!(second, "Doe_Jane_20260309_143005-2.json");

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.join(&first)).unwrap()).unwrap();
        assert_eq!(written["fields"]["pt-lastname"], "Doe");

        let invalid = NewPatientForm::default();
        assert!(matches!(
            service.submit_at(&invalid, today()).await,
            Err(IntakeError::Validation(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use utoipa::ToSchema;

pub const MIN_AGE: i32 = 5;
pub const MAX_AGE: i32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "education_level_enum")]
pub enum EducationLevel {
    #[sqlx(rename = "1st")]
    #[serde(rename = "1st")]
    First,
    #[sqlx(rename = "2nd")]
    #[serde(rename = "2nd")]
    Second,
    #[sqlx(rename = "3rd")]
    #[serde(rename = "3rd")]
    Third,
    #[sqlx(rename = "4th")]
    #[serde(rename = "4th")]
    Fourth,
    #[sqlx(rename = "5th")]
    #[serde(rename = "5th")]
    Fifth,
    #[sqlx(rename = "6th")]
    #[serde(rename = "6th")]
    Sixth,
    #[sqlx(rename = "7th")]
    #[serde(rename = "7th")]
    Seventh,
    #[sqlx(rename = "8th")]
    #[serde(rename = "8th")]
    Eighth,
    #[sqlx(rename = "9th")]
    #[serde(rename = "9th")]
    Ninth,
    #[sqlx(rename = "10th")]
    #[serde(rename = "10th")]
    Tenth,
    #[sqlx(rename = "11th")]
    #[serde(rename = "11th")]
    Eleventh,
    #[sqlx(rename = "12th")]
    #[serde(rename = "12th")]
    Twelfth,
    #[sqlx(rename = "college")]
    #[serde(rename = "college")]
    College,
}

impl EducationLevel {
    const TAGS: [(&'static str, EducationLevel); 13] = [
        ("1st", EducationLevel::First),
        ("2nd", EducationLevel::Second),
        ("3rd", EducationLevel::Third),
        ("4th", EducationLevel::Fourth),
        ("5th", EducationLevel::Fifth),
        ("6th", EducationLevel::Sixth),
        ("7th", EducationLevel::Seventh),
        ("8th", EducationLevel::Eighth),
        ("9th", EducationLevel::Ninth),
        ("10th", EducationLevel::Tenth),
        ("11th", EducationLevel::Eleventh),
        ("12th", EducationLevel::Twelfth),
        ("college", EducationLevel::College),
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_ascii_lowercase();
        Self::TAGS
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, level)| *level)
    }

    pub fn tag(&self) -> &'static str {
        Self::TAGS
            .iter()
            .find(|(_, level)| level == self)
            .map(|(t, _)| *t)
            .unwrap_or("college")
    }

    /// "7th Grade", "College".
    pub fn label(&self) -> String {
        match self {
            EducationLevel::College => "College".to_string(),
            grade => format!("{} Grade", grade.tag()),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub user_id: String,
    pub age: i32,
    pub education_level: EducationLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: &str, age: i32, education_level: EducationLevel) -> Self {
        UserProfile {
            user_id: user_id.to_string(),
            age,
            education_level,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Suffix appended to the system prompt so answers fit the student.
    pub fn prompt_context(&self) -> String {
        format!(
            "The student is {} years old and is in {}. Adapt your vocabulary, tone and the depth of your explanations to this level.",
            self.age,
            self.education_level.label()
        )
    }
}

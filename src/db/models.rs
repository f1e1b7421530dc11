//! Database Models - rows of the `blogs`, `sections` and `admin_sessions` tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{types::Json, FromRow};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error for a text column or query parameter that names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a text-backed enum with `as_str`, `Display`, `FromStr` and the
/// `TryFrom<String>` conversion used by `#[sqlx(try_from = "String")]`.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownVariant;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

text_enum!(BlogCategory, "blog category", {
    Experience => "experience",
    Projects => "projects",
    Certifications => "certifications",
    Participations => "participations",
    Skills => "skills",
    Education => "education",
    Services => "services",
    ProfessionalSummary => "professional_summary",
    KeyAchievements => "key_achievements",
});

impl BlogCategory {
    pub fn label(&self) -> &'static str {
        match self {
            BlogCategory::Experience => "Experience",
            BlogCategory::Projects => "Projects",
            BlogCategory::Certifications => "Certifications",
            BlogCategory::Participations => "Participations",
            BlogCategory::Skills => "Skills",
            BlogCategory::Education => "Education",
            BlogCategory::Services => "What I Do",
            BlogCategory::ProfessionalSummary => "Professional Summary",
            BlogCategory::KeyAchievements => "Key Achievements",
        }
    }
}

text_enum!(SectionType, "section type", {
    Hero => "hero",
    About => "about",
    Services => "services",
    ProfessionalSummary => "professional_summary",
    KeyAchievements => "key_achievements",
    CvDownload => "cv_download",
    Projects => "projects",
    Cv => "cv",
    Contact => "contact",
    Testimonials => "testimonials",
    Custom => "custom",
});

impl SectionType {
    /// Section types whose payload carries an attachment list.
    pub fn holds_attachments(&self) -> bool {
        matches!(self, SectionType::Cv | SectionType::CvDownload)
    }
}

/// Uploaded file referenced from a blog post or a CV section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    /// Object key inside the bucket.
    pub path: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: u64,
    pub url: String,
}

/// Blog post row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    #[sqlx(try_from = "Option<String>")]
    pub category: OptionalCategory,
    pub image_url: Option<String>,
    pub published: bool,
    pub attachments: Json<Vec<Attachment>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `Option<BlogCategory>` decoded from a nullable text column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionalCategory(pub Option<BlogCategory>);

impl TryFrom<Option<String>> for OptionalCategory {
    type Error = UnknownVariant;

    fn try_from(value: Option<String>) -> Result<Self, Self::Error> {
        match value.as_deref() {
            None | Some("") => Ok(OptionalCategory(None)),
            Some(s) => s.parse().map(|c| OptionalCategory(Some(c))),
        }
    }
}

impl BlogPost {
    pub fn category(&self) -> Option<BlogCategory> {
        self.category.0
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments.0
    }
}

/// Section row as stored; `data` is still untyped JSON here.
#[derive(Debug, Clone, FromRow)]
pub struct SectionRow {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub section_type: SectionType,
    pub title: String,
    pub subtitle: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub cv_file_url: Option<String>,
    pub data: Json<Value>,
    pub order_index: i32,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Homepage section with its payload decoded for its type.
#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub id: Uuid,
    pub section_type: SectionType,
    pub title: String,
    pub subtitle: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub cv_file_url: Option<String>,
    pub data: SectionData,
    pub order_index: i32,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SectionRow> for Section {
    type Error = serde_json::Error;

    fn try_from(row: SectionRow) -> Result<Self, Self::Error> {
        let data = SectionData::decode(row.section_type, row.data.0)?;
        Ok(Section {
            id: row.id,
            section_type: row.section_type,
            title: row.title,
            subtitle: row.subtitle,
            content: row.content,
            image_url: row.image_url,
            cv_file_url: row.cv_file_url,
            data,
            order_index: row.order_index,
            published: row.published,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceItem {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicesData {
    #[serde(default)]
    pub services: Vec<ServiceItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryData {
    #[serde(default)]
    pub summary: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AchievementsData {
    #[serde(default)]
    pub achievements: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentsData {
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Section payload. The variant is selected by the owning section's
/// `section_type`; serialisation writes the inner object only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SectionData {
    Services(ServicesData),
    ProfessionalSummary(SummaryData),
    KeyAchievements(AchievementsData),
    Attachments(AttachmentsData),
    Freeform(Map<String, Value>),
}

impl SectionData {
    /// Decode a stored or submitted JSON value for `section_type`.
    /// `null` is treated as an empty object.
    pub fn decode(section_type: SectionType, value: Value) -> Result<Self, serde_json::Error> {
        let value = if value.is_null() {
            Value::Object(Map::new())
        } else {
            value
        };
        Ok(match section_type {
            SectionType::Services => SectionData::Services(serde_json::from_value(value)?),
            SectionType::ProfessionalSummary => {
                SectionData::ProfessionalSummary(serde_json::from_value(value)?)
            }
            SectionType::KeyAchievements => {
                SectionData::KeyAchievements(serde_json::from_value(value)?)
            }
            SectionType::Cv | SectionType::CvDownload => {
                SectionData::Attachments(serde_json::from_value(value)?)
            }
            SectionType::Hero
            | SectionType::About
            | SectionType::Projects
            | SectionType::Contact
            | SectionType::Testimonials
            | SectionType::Custom => SectionData::Freeform(serde_json::from_value(value)?),
        })
    }

    pub fn empty(section_type: SectionType) -> Self {
        Self::decode(section_type, Value::Null).unwrap_or_else(|_| SectionData::Freeform(Map::new()))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    pub fn attachments(&self) -> &[Attachment] {
        match self {
            SectionData::Attachments(data) => &data.attachments,
            _ => &[],
        }
    }

    pub fn attachments_mut(&mut self) -> Option<&mut Vec<Attachment>> {
        match self {
            SectionData::Attachments(data) => Some(&mut data.attachments),
            _ => None,
        }
    }
}

/// One issued OTP code.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OtpSession {
    pub id: Uuid,
    pub email: String,
    pub otp_code: String,
    pub verified: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_round_trips_through_text() {
        for category in BlogCategory::ALL {
            assert_eq!(category.as_str().parse::<BlogCategory>(), Ok(*category));
        }
        assert!("blogroll".parse::<BlogCategory>().is_err());
    }

    #[test]
    fn test_optional_category_accepts_empty_text() {
        assert_eq!(OptionalCategory::try_from(None), Ok(OptionalCategory(None)));
        assert_eq!(
            OptionalCategory::try_from(Some(String::new())),
            Ok(OptionalCategory(None))
        );
        assert_eq!(
            OptionalCategory::try_from(Some("skills".to_string())),
            Ok(OptionalCategory(Some(BlogCategory::Skills)))
        );
    }

    #[test]
    fn test_section_data_decodes_by_type() {
        let data = SectionData::decode(
            SectionType::Services,
            json!({"services": [{"title": "Web apps", "description": "Full stack"}]}),
        )
        .unwrap();
        match &data {
            SectionData::Services(s) => assert_eq!(s.services[0].title, "Web apps"),
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(
            data.to_value(),
            json!({"services": [{"title": "Web apps", "description": "Full stack"}]})
        );
    }

    #[test]
    fn test_section_data_empty_object_is_valid_for_every_type() {
        for section_type in SectionType::ALL {
            assert!(SectionData::decode(*section_type, json!({})).is_ok());
            assert!(SectionData::decode(*section_type, Value::Null).is_ok());
        }
    }

    #[test]
    fn test_section_data_rejects_wrong_shape() {
        assert!(SectionData::decode(SectionType::ProfessionalSummary, json!({"summary": "x"})).is_err());
        assert!(SectionData::decode(SectionType::Custom, json!([1, 2])).is_err());
    }

    #[test]
    fn test_attachment_serializes_type_field() {
        let attachment = Attachment {
            id: "abc".to_string(),
            filename: "cv.pdf".to_string(),
            path: "x.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size: 42,
            url: "/storage/cv-files/x.pdf".to_string(),
        };
        let value = serde_json::to_value(&attachment).unwrap();
        assert_eq!(value["type"], "application/pdf");
    }
}

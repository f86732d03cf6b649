use crate::error::WorkerError;
use crate::result::Result;

use std::collections::HashMap;

pub const CREATED_AT_FIELD: &str = "createdAt";
pub const TEXT_FIELD: &str = "text";
pub const IMG_URL_FIELD: &str = "img_url";
pub const USERNAME_FIELD: &str = "username";

/// A post as stored in its hash record. Fields the worker never touches
/// stay in the store and are not carried here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub key: String,
    pub created_at: i64,
    pub text: Option<String>,
    pub img_url: Option<String>,
}

impl Post {
    pub fn from_fields(key: &str, fields: &HashMap<String, String>) -> Result<Post> {
        if fields.is_empty() {
            return Err(WorkerError::missing_record(key, "no record"));
        }

        let created_at = match fields.get(CREATED_AT_FIELD) {
            Some(created_at) => created_at.trim().parse::<i64>().map_err(|_| {
                WorkerError::missing_record(
                    key,
                    &format!("{} is not an integer: {:?}", CREATED_AT_FIELD, created_at),
                )
            })?,
            None => {
                return Err(WorkerError::missing_record(
                    key,
                    &format!("no {}", CREATED_AT_FIELD),
                ))
            }
        };

        if created_at.checked_neg().is_none() {
            return Err(WorkerError::missing_record(
                key,
                &format!("{} is out of range: {}", CREATED_AT_FIELD, created_at),
            ));
        }

        let text = Self::non_empty(fields.get(TEXT_FIELD));
        let img_url = Self::non_empty(fields.get(IMG_URL_FIELD));

        if text.is_none() && img_url.is_none() {
            return Err(WorkerError::missing_record(
                key,
                &format!("neither {} nor {} is set", TEXT_FIELD, IMG_URL_FIELD),
            ));
        }

        Ok(Post {
            key: key.to_owned(),
            created_at,
            text,
            img_url,
        })
    }

    fn non_empty(value: Option<&String>) -> Option<String> {
        value.filter(|value| !value.is_empty()).cloned()
    }
}

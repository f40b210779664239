use crate::models::{FileDescriptor, UploadError};
use crate::services::upload_facade::UploadFacade;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use validator::{ValidationError, ValidationErrors};

/// Named checks applied to one form field
#[derive(Debug, Clone)]
pub enum Rule {
    /// Text must be non-blank; a file entry must be present
    NotEmpty,
    /// File was uploaded now or kept from an earlier request
    UploadNotEmpty,
    /// File entry is well-formed
    UploadValid,
    /// File is at most this many bytes
    UploadSize(u64),
    /// Lowercase extensions the original filename may carry
    UploadType(Vec<String>),
}

impl Rule {
    fn code(&self) -> &'static str {
        match self {
            Rule::NotEmpty => "not_empty",
            Rule::UploadNotEmpty => "upload_not_empty",
            Rule::UploadValid => "upload_valid",
            Rule::UploadSize(_) => "upload_size",
            Rule::UploadType(_) => "upload_type",
        }
    }

    /// Error reported for `field` when this rule fails
    pub fn error(&self, field: &str) -> ValidationError {
        ValidationError::new(self.code()).with_message(Cow::Owned(self.message(field)))
    }

    fn message(&self, field: &str) -> String {
        match self {
            Rule::NotEmpty => format!("{} must not be empty", field),
            Rule::UploadNotEmpty => format!("{} must be an uploaded file", field),
            Rule::UploadValid => format!("{} is not a valid upload", field),
            Rule::UploadSize(max) => format!("{} must not exceed {} bytes", field, max),
            Rule::UploadType(allowed) => {
                format!("{} must be one of: {}", field, allowed.join(", "))
            }
        }
    }
}

/// A submitted form: uploads plus plain fields.
#[derive(Debug, Default, Clone)]
pub struct FormData {
    pub files: BTreeMap<String, FileDescriptor>,
    pub fields: HashMap<String, String>,
}

enum Value<'a> {
    File(&'a FileDescriptor),
    Text(&'a str),
}

impl FormData {
    pub fn new(files: BTreeMap<String, FileDescriptor>, fields: HashMap<String, String>) -> Self {
        Self { files, fields }
    }

    // Files shadow plain fields of the same name
    fn value(&self, field: &str) -> Option<Value<'_>> {
        self.files
            .get(field)
            .map(Value::File)
            .or_else(|| self.fields.get(field).map(|s| Value::Text(s.as_str())))
    }
}

/// Rule set checked against a [`FormData`].
#[derive(Debug, Default, Clone)]
pub struct Validation {
    rules: Vec<(&'static str, Rule)>,
}

impl Validation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, field: &'static str, rule: Rule) -> Self {
        self.rules.push((field, rule));
        self
    }

    /// Runs rules in insertion order. Absent fields only answer to `NotEmpty`.
    pub fn check(&self, data: &FormData, uploads: &UploadFacade) -> Result<(), ValidationErrors> {
        self.check_after(Ok(()), data, uploads)
    }

    /// Same as [`Validation::check`], on top of errors already reported, e.g. by a
    /// derived `Validate`. Fields that already failed are skipped.
    pub fn check_after(
        &self,
        prior: Result<(), ValidationErrors>,
        data: &FormData,
        uploads: &UploadFacade,
    ) -> Result<(), ValidationErrors> {
        let mut errors = prior.err().unwrap_or_else(ValidationErrors::new);

        for (field, rule) in &self.rules {
            if errors.field_errors().contains_key(*field) {
                continue;
            }

            let passed = match data.value(field) {
                None => !matches!(rule, Rule::NotEmpty),
                Some(value) => passes(rule, &value, uploads),
            };

            if !passed {
                errors.add(*field, rule.error(field));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn passes(rule: &Rule, value: &Value<'_>, uploads: &UploadFacade) -> bool {
    let file = match (rule, value) {
        (Rule::NotEmpty, Value::Text(text)) => return !text.trim().is_empty(),
        (Rule::NotEmpty, Value::File(_)) => return true,
        (_, Value::Text(_)) => return false,
        (_, Value::File(file)) => *file,
    };

    match rule {
        Rule::NotEmpty => true,
        Rule::UploadNotEmpty => uploads.is_usable_upload(file),
        Rule::UploadValid => is_valid_upload(file),
        Rule::UploadSize(max) => upload_size_ok(file, *max),
        Rule::UploadType(allowed) => upload_type_ok(file, allowed),
    }
}

/// A successful upload must name both the client file and the stored bytes.
pub fn is_valid_upload(file: &FileDescriptor) -> bool {
    !file.upload_error.is_ok()
        || (!file.original_name.is_empty() && !file.content_path.as_os_str().is_empty())
}

/// Failed uploads are left to `UploadNotEmpty`, except for size overflows.
pub fn upload_size_ok(file: &FileDescriptor, max: u64) -> bool {
    match file.upload_error {
        UploadError::Ok => file.size_bytes <= max,
        UploadError::IniSize | UploadError::FormSize => false,
        _ => true,
    }
}

pub fn upload_type_ok(file: &FileDescriptor, allowed: &[String]) -> bool {
    if !file.upload_error.is_ok() {
        return true;
    }

    Path::new(&file.original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

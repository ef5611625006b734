//! Response-side checks: declared status, declared media type, body schema.

use super::compiled::{negotiate, CompiledValidatorSet, MediaValidators};
use super::visibility::{remove_additional, strip_write_only};
use crate::context::essence;
use crate::error::{ApiError, ErrorLocation, ValidationError};
use crate::spec::ResponseKey;
use serde_json::Value;
use tracing::warn;

impl CompiledValidatorSet {
    /// Declared responses for `status`: exact code, then `NXX`, then `default`.
    pub(crate) fn response_for(&self, status: u16) -> Option<(ResponseKey, &MediaValidators)> {
        [ResponseKey::Status(status), ResponseKey::Range(status / 100), ResponseKey::Default]
            .into_iter()
            .find_map(|key| self.responses.get(&key).map(|m| (key, m)))
    }

    /// Check a handler's output and return the body to send.
    ///
    /// `writeOnly` properties are removed before validation so they never leave
    /// the service. A no-op when response validation is off.
    ///
    /// # Errors
    ///
    /// [`ApiError::InternalServerError`] carrying the violations.
    pub fn validate_response(
        &self,
        status: u16,
        content_type: Option<&str>,
        body: Option<Value>,
    ) -> Result<Option<Value>, ApiError> {
        let Some(opts) = self.response_options else {
            return Ok(body);
        };
        if self.responses.is_empty() {
            return Ok(body);
        }

        let Some((key, declared)) = self.response_for(status) else {
            warn!(operation = %self.operation.key(), status, "Undeclared response status");
            return Err(ApiError::response_violation(vec![ValidationError::new(
                ErrorLocation::ResponseBody,
                "",
                "status",
                format!("no response declared for status {status}"),
            )]));
        };

        let Some(mut body) = body else {
            return Ok(None);
        };
        if declared.is_empty() {
            return Ok(Some(body));
        }

        let media = content_type.map(essence).unwrap_or_else(|| "application/json".to_string());
        let Some((_, compiled)) = negotiate(declared, &media) else {
            return Err(ApiError::response_violation(vec![ValidationError::new(
                ErrorLocation::ResponseBody,
                "",
                "contentType",
                format!("content type {media} is not declared for response {key}"),
            )]));
        };
        let Some(compiled) = compiled else {
            return Ok(Some(body));
        };

        strip_write_only(&mut body, compiled.schema());
        remove_additional(&mut body, compiled.schema(), opts.remove_additional);
        let errors = compiled.validate(&body, ErrorLocation::ResponseBody);
        if errors.is_empty() {
            Ok(Some(body))
        } else {
            warn!(operation = %self.operation.key(), status, errors = errors.len(), "Response failed validation");
            Err(ApiError::response_violation(errors))
        }
    }
}

//! Interpretation of RFC 7662 introspection responses

use crate::errors::{IntrospectionError, UpstreamError};
use crate::principal::{claims, numeric_date, Authority, Principal};
use serde_json::{Map, Value};

/// Prefix of authorities derived from the `scope` claim
pub const SCOPE_AUTHORITY_PREFIX: &str = "SCOPE_";

/// Turn an introspection response body into a principal.
///
/// Inactive tokens are `InvalidToken`; any structural problem with the
/// response is an upstream failure.
pub(crate) fn into_principal(body: Value) -> Result<Principal, IntrospectionError> {
    let Value::Object(attributes) = body else {
        return Err(malformed("response is not a JSON object"));
    };

    match attributes.get(claims::ACTIVE) {
        Some(Value::Bool(true)) => {}
        Some(Value::Bool(false)) => {
            return Err(IntrospectionError::invalid_token("Provided token isn't active"))
        }
        Some(_) => return Err(malformed("'active' is not a boolean")),
        None => return Err(malformed("'active' is missing")),
    }

    for claim in [claims::EXPIRES_AT, claims::ISSUED_AT, claims::NOT_BEFORE] {
        if let Some(value) = attributes.get(claim) {
            if numeric_date(value).is_none() {
                return Err(malformed(format!("'{claim}' is not a NumericDate")));
            }
        }
    }

    let authorities = scope_authorities(&attributes)?;
    Ok(Principal::new(attributes, authorities))
}

/// Authorities for the `scope` claim, `SCOPE_<scope>` in claim order
fn scope_authorities(attributes: &Map<String, Value>) -> Result<Vec<Authority>, IntrospectionError> {
    let scopes: Vec<&str> = match attributes.get(claims::SCOPE) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(scope)) => scope.split_whitespace().collect(),
        Some(Value::Array(scopes)) => scopes
            .iter()
            .map(|s| s.as_str().ok_or_else(|| malformed("'scope' contains a non string value")))
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(malformed("'scope' is neither a string nor a list")),
    };
    Ok(scopes
        .into_iter()
        .map(|scope| Authority::new(format!("{SCOPE_AUTHORITY_PREFIX}{scope}")))
        .collect())
}

fn malformed<S: Into<String>>(reason: S) -> IntrospectionError {
    UpstreamError::MalformedResponse(reason.into()).into()
}

//! Ready-made [`FieldExtractor`]s for the logging interceptor.

use super::FieldExtractor;
use crate::call::CallContext;
use crate::logger::Field;
use std::sync::Arc;

/// `method=/package.Service/Method`
pub fn method() -> FieldExtractor {
    Arc::new(|ctx: &CallContext| Field::new("method", ctx.method()))
}

/// `service=package.Service`
pub fn service() -> FieldExtractor {
    Arc::new(|ctx: &CallContext| Field::new("service", ctx.service()))
}

/// `peer=<address>`, empty when the transport did not report one.
pub fn peer_addr() -> FieldExtractor {
    Arc::new(|ctx: &CallContext| {
        let peer = ctx.peer().map(|addr| addr.to_string()).unwrap_or_default();
        Field::new("peer", peer)
    })
}

/// The ASCII metadata value under `key`, empty when absent.
pub fn metadata(key: impl Into<String>) -> FieldExtractor {
    let key = key.into();
    Arc::new(move |ctx: &CallContext| {
        let value = ctx
            .metadata()
            .get(key.as_str())
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        Field::new(key.clone(), value)
    })
}

/// The same field on every record, e.g. the component name.
pub fn constant(key: impl Into<String>, value: impl Into<String>) -> FieldExtractor {
    let field = Field {
        key: key.into(),
        value: value.into(),
    };
    Arc::new(move |_: &CallContext| field.clone())
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Namespace and selector scoping for list and watch calls.

use crate::error::{Error, Result};
use kube::api::{ListParams, WatchParams};
use kube::{Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::OnceCell;

/// Scope of a list/watch: an optional namespace plus label and field selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilter {
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
}

impl ListFilter {
    /// Everything, across all namespaces.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn namespaced(namespace: &str) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }
    }

    /// A single named resource, selected with `metadata.name=<name>`.
    pub fn for_name(namespace: &str, name: &str) -> Self {
        Self::namespaced(namespace).fields(&format!("metadata.name={}", name))
    }

    pub fn labels(mut self, selector: &str) -> Self {
        self.label_selector = Some(selector.to_string());
        self
    }

    pub fn fields(mut self, selector: &str) -> Self {
        self.field_selector = Some(selector.to_string());
        self
    }

    pub fn list_params(&self) -> ListParams {
        let mut lp = ListParams::default();
        if let Some(labels) = &self.label_selector {
            lp = lp.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            lp = lp.fields(fields);
        }
        lp
    }

    pub fn watch_params(&self) -> WatchParams {
        let mut wp = WatchParams::default();
        if let Some(labels) = &self.label_selector {
            wp = wp.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            wp = wp.fields(fields);
        }
        wp
    }

    /// Reject selectors [`ListFilter::matches`] cannot evaluate, the way the API
    /// server answers them with a 400.
    pub fn validate(&self) -> Result<()> {
        if let Some(selector) = &self.label_selector {
            if let Some(term) = terms(selector).find(|t| matches!(t, Term::Unsupported(_))) {
                return Err(invalid("label", &term));
            }
        }
        if let Some(selector) = &self.field_selector {
            // Field selectors only know `=`, `==` and `!=`.
            let unsupported =
                terms(selector).find(|t| !matches!(t, Term::Eq(..) | Term::NotEq(..)));
            if let Some(term) = unsupported {
                return Err(invalid("field", &term));
            }
        }
        Ok(())
    }

    /// Evaluate the filter locally against an object.
    ///
    /// Labels support equality (`k=v`, `k==v`, `k!=v`), existence (`k`, `!k`)
    /// and set (`k in (a,b)`, `k notin (a,b)`) requirements. Field selectors
    /// address any path of the serialized object, such as `status.phase`;
    /// a missing field compares as the empty string. Terms rejected by
    /// [`ListFilter::validate`] never match.
    pub fn matches<K: Resource + Serialize>(&self, obj: &K) -> bool {
        if let Some(ns) = &self.namespace {
            if obj.namespace().as_deref() != Some(ns.as_str()) {
                return false;
            }
        }

        let labels = obj.labels();
        let labels_match = self.label_selector.as_deref().map_or(true, |selector| {
            terms(selector).all(|term| match term {
                Term::Eq(k, v) => labels.get(k).is_some_and(|l| l == v),
                Term::NotEq(k, v) => labels.get(k).map_or(true, |l| l != v),
                Term::Exists(k) => labels.contains_key(k),
                Term::NotExists(k) => !labels.contains_key(k),
                Term::In(k, values) => labels.get(k).is_some_and(|l| values.contains(&l.as_str())),
                Term::NotIn(k, values) => {
                    labels.get(k).map_or(true, |l| !values.contains(&l.as_str()))
                }
                Term::Unsupported(_) => false,
            })
        });
        if !labels_match {
            return false;
        }

        let json = OnceCell::new();
        self.field_selector.as_deref().map_or(true, |selector| {
            terms(selector).all(|term| {
                let (path, expected, equal) = match term {
                    Term::Eq(k, v) => (k, v, true),
                    Term::NotEq(k, v) => (k, v, false),
                    _ => return false,
                };
                let actual = match path {
                    "metadata.name" => obj.name_any(),
                    "metadata.namespace" => obj.namespace().unwrap_or_default(),
                    _ => field_value(json.get_or_init(|| serde_json::to_value(obj).ok()), path),
                };
                (actual == expected) == equal
            })
        })
    }
}

fn invalid(kind: &str, term: &Term<'_>) -> Error {
    Error::Api {
        code: 400,
        message: format!("unsupported {} selector requirement {:?}", kind, term),
    }
}

/// The value at a dotted path rendered as a string, or empty when absent.
fn field_value(object: &Option<Value>, path: &str) -> String {
    let pointer = format!("/{}", path.replace('.', "/"));
    match object.as_ref().and_then(|o| o.pointer(&pointer)) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, PartialEq)]
enum Term<'a> {
    Eq(&'a str, &'a str),
    NotEq(&'a str, &'a str),
    Exists(&'a str),
    NotExists(&'a str),
    In(&'a str, Vec<&'a str>),
    NotIn(&'a str, Vec<&'a str>),
    Unsupported(&'a str),
}

/// Split a selector into requirements at commas outside parentheses.
fn requirements(selector: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in selector.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&selector[start..]);
    parts
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

/// `key op (v1,v2)` split into its key, operator and values.
fn set_expression(term: &str) -> Option<(&str, &str, Vec<&str>)> {
    let open = term.find('(')?;
    let values = term[open + 1..].trim_end().strip_suffix(')')?;
    let mut head = term[..open].split_whitespace();
    let (key, op) = (head.next()?, head.next()?);
    if head.next().is_some() {
        return None;
    }
    let values = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    Some((key, op, values))
}

fn terms(selector: &str) -> impl Iterator<Item = Term<'_>> {
    requirements(selector).into_iter().map(|t| {
        if t.contains('(') {
            match set_expression(t) {
                Some((k, "in", values)) => Term::In(k, values),
                Some((k, "notin", values)) => Term::NotIn(k, values),
                _ => Term::Unsupported(t),
            }
        } else if let Some((k, v)) = t.split_once("!=") {
            Term::NotEq(k.trim(), v.trim())
        } else if let Some((k, v)) = t.split_once("==") {
            Term::Eq(k.trim(), v.trim())
        } else if let Some((k, v)) = t.split_once('=') {
            Term::Eq(k.trim(), v.trim())
        } else if t.contains(char::is_whitespace) {
            Term::Unsupported(t)
        } else if let Some(k) = t.strip_prefix('!') {
            Term::NotExists(k.trim())
        } else {
            Term::Exists(t)
        }
    })
}

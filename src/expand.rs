use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    Error, Param, Params,
    placeholder::{parse, placeholder, replace_placeholders},
};

/// Default bound on nested fragment expansion passes.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Lookup of named sub-templates used by [`expand_template`].
pub trait FragmentSource {
    fn fragment(&self, name: &str) -> Option<&str>;
}

impl FragmentSource for HashMap<String, String> {
    fn fragment(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl FragmentSource for BTreeMap<String, String> {
    fn fragment(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl<S: FragmentSource + ?Sized> FragmentSource for &S {
    fn fragment(&self, name: &str) -> Option<&str> {
        (**self).fragment(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandOptions {
    /// Maximum number of nested expansion passes before
    /// [`Error::TemplateCycle`] is returned.
    pub max_depth: usize,
    /// Reject placeholders that are neither fragments nor parameters.
    pub strict: bool,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            strict: false,
        }
    }
}

/// Expands every placeholder that names a fragment in `fragments`,
/// recursively, until nothing left in the template resolves to a fragment.
///
/// Placeholders without a fragment are kept as-is for parameter binding.
pub fn expand_template<S: FragmentSource>(sql: &str, fragments: S) -> Result<String, Error> {
    expand_template_with(sql, fragments, &ExpandOptions::default())
}

pub fn expand_template_with<S: FragmentSource>(
    sql: &str,
    fragments: S,
    options: &ExpandOptions,
) -> Result<String, Error> {
    let mut sql = sql.to_string();
    let mut passes = 0;
    loop {
        let mut expanded = BTreeSet::new();
        let next = {
            let segments = parse(&sql)?;
            replace_placeholders(&segments, |key| {
                let text = fragments.fragment(key)?;
                expanded.insert(key.to_string());
                Some(text)
            })
        };
        if expanded.is_empty() {
            return Ok(sql);
        }
        if passes == options.max_depth {
            return Err(Error::TemplateCycle {
                depth: options.max_depth,
                keys: expanded.into_iter().collect(),
            });
        }
        tracing::trace!(pass = passes, keys = ?expanded, "expanded fragments");
        passes += 1;
        sql = next;
    }
}

/// Flattens list parameters into indexed scalars.
///
/// `key -> [a, b]` adds `key_0 -> a` and `key_1 -> b` to the mapping and
/// rewrites `%(key)s` to `(%(key_0)s, %(key_1)s)`. The list entry itself is
/// kept. Lists whose placeholder is absent from the template are still
/// flattened into the mapping. An empty list renders as `(NULL)`.
///
/// A generated name that is already a parameter, or that another list
/// generates, is rejected with [`Error::ParamCollision`].
pub fn expand_params(sql: &str, mut params: Params) -> Result<(String, Params), Error> {
    let lists: Vec<(String, Vec<_>)> = params
        .iter()
        .filter_map(|(key, param)| match param {
            Param::List(values) => Some((key.clone(), values.clone())),
            Param::Scalar(_) => None,
        })
        .collect();
    if lists.is_empty() {
        return Ok((sql.to_string(), params));
    }

    let mut sql = sql.to_string();
    let mut flattened: Vec<(String, Param)> = Vec::new();
    for (key, values) in lists {
        let names: Vec<String> = (0..values.len()).map(|i| format!("{}_{}", key, i)).collect();
        if let Some(name) = names
            .iter()
            .find(|name| params.contains_key(name) || flattened.iter().any(|(n, _)| n == *name))
        {
            return Err(Error::ParamCollision(name.clone()));
        }
        let replacement = if names.is_empty() {
            "(NULL)".to_string()
        } else {
            let placeholders: Vec<String> = names.iter().map(|name| placeholder(name)).collect();
            format!("({})", placeholders.join(", "))
        };
        sql = {
            let segments = parse(&sql)?;
            replace_placeholders(&segments, |k| (k == key).then_some(replacement.as_str()))
        };
        flattened.extend(
            names
                .into_iter()
                .zip(values)
                .map(|(name, value)| (name, Param::Scalar(value))),
        );
    }
    params.extend(flattened);
    Ok((sql, params))
}

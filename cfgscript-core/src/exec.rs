//! Running a config's `main` function

use crate::config::Config;
use crate::engine::{ReturnShape, ScriptEngine, ScriptValue};
use crate::{CancellationToken, Error, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// Name of the entry function
pub const MAIN_FUNCTION: &str = "main";

/// Options adjusting how `main` is executed.
#[derive(Debug, Clone)]
pub struct ExecOptions<V> {
    vars: BTreeMap<String, V>,
}

impl<V> Default for ExecOptions<V> {
    fn default() -> Self {
        Self {
            vars: BTreeMap::new(),
        }
    }
}

impl<V> ExecOptions<V> {
    /// No injected variables
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `key: value` to the `ctx.vars` mapping
    pub fn with_var(mut self, key: impl Into<String>, value: V) -> Self {
        self.vars.insert(key.into(), value);
        self
    }

    /// Add every pair to the `ctx.vars` mapping
    pub fn with_vars(mut self, vars: impl IntoIterator<Item = (String, V)>) -> Self {
        self.vars.extend(vars);
        self
    }

    /// The injected variables
    pub fn vars(&self) -> &BTreeMap<String, V> {
        &self.vars
    }

    pub(crate) fn into_vars(self) -> Vec<(String, V)> {
        self.vars.into_iter().collect()
    }
}

impl<E: ScriptEngine> Config<E> {
    /// Execute `main(ctx)` from the top-level module.
    ///
    /// `main` must return either the engine's empty value or a list of
    /// records; the records are returned in order.
    pub fn main(
        &self,
        cancel: &CancellationToken,
        options: ExecOptions<E::Value>,
    ) -> Result<Vec<E::Record>> {
        let main = self
            .locals()
            .get(MAIN_FUNCTION)
            .ok_or_else(|| Error::NoMainFunction {
                filename: self.filename().to_string(),
            })?;
        if !main.is_callable() {
            return Err(Error::NotCallable {
                kind: main.type_name(),
            });
        }

        let engine = self.engine();
        let ctx = engine.new_context(options.into_vars());
        let returned = engine.call(cancel, main, vec![ctx])?;

        let records = match returned.shape() {
            ReturnShape::Empty => Vec::new(),
            ReturnShape::Sequence(items) => {
                let bridge = engine.bridge();
                let mut records = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let record = bridge.to_record(item).ok_or_else(|| Error::InvalidReturnShape {
                        kind: item.type_name(),
                        index: Some(index),
                    })?;
                    records.push(record);
                }
                records
            }
            ReturnShape::Other => {
                return Err(Error::InvalidReturnShape {
                    kind: returned.type_name(),
                    index: None,
                })
            }
        };

        debug!("main() in {} returned {} records", self.filename(), records.len());
        Ok(records)
    }
}

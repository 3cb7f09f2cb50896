//! jq queries over JSON message bodies.
//!
//! Queries are compiled once by jaq, with the jq standard library and the
//! JSON functions (`fromjson`, `tojson`, ...) in scope, and then run against
//! every parsed body.
//!
//! # Example
//!
//! ```rust
//! use rmqdump::core::query::Query;
//! use serde_json::json;
//!
//! let query = Query::parse(".user.role == \"admin\"").unwrap();
//! let results = query.run(&json!({"user": {"role": "admin"}})).unwrap();
//! assert_eq!(results, vec![json!(true)]);
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use jaq_core::compile::Undefined;
use jaq_core::load::{self, Arena, File, Loader};
use jaq_core::{Compiler, Ctx, Native, RcIter};
use jaq_json::Val;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while parsing or running a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The query text is not valid.
    #[error("{message} at offset {offset}")]
    Parse {
        /// Byte offset into the query text
        offset: usize,
        message: String,
    },

    /// The query failed on a particular input.
    #[error("{0}")]
    Runtime(String),
}

impl QueryError {
    fn parse(offset: usize, message: impl Into<String>) -> Self {
        QueryError::Parse {
            offset,
            message: message.into(),
        }
    }

    fn runtime(message: impl Into<String>) -> Self {
        QueryError::Runtime(message.into())
    }
}

type Filter = jaq_core::Filter<Native<Val>>;

/// A compiled query.
///
/// Compilation happens once; [`Query::run`] can then be called concurrently
/// from any thread.
#[derive(Clone)]
pub struct Query {
    source: String,
    filter: Arc<Filter>,
}

impl Query {
    /// Compiles query text.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Parse`] on syntax errors and on calls to
    /// functions that are not defined.
    pub fn parse(source: &str) -> Result<Self, QueryError> {
        let arena = Arena::default();
        let loader = Loader::new(jaq_std::defs().chain(jaq_json::defs()));
        let program = File {
            code: source,
            path: (),
        };
        let modules = loader
            .load(&arena, program)
            .map_err(|errors| load_error(source, errors))?;
        let filter = Compiler::default()
            .with_funs(jaq_std::funs().chain(jaq_json::funs()))
            .compile(modules)
            .map_err(|errors| compile_error(source, errors))?;

        Ok(Self {
            source: source.to_string(),
            filter: Arc::new(filter),
        })
    }

    /// Runs the query against `input`, returning every output value.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Runtime`] on the first error the query raises.
    pub fn run(&self, input: &Value) -> Result<Vec<Value>, QueryError> {
        let mut values = Vec::new();
        let failed = self.find_map(input, |output| match output {
            Ok(value) => {
                values.push(value);
                None
            }
            Err(e) => Some(e),
        })?;
        match failed {
            Some(e) => Err(e),
            None => Ok(values),
        }
    }

    /// Feeds outputs to `visit` lazily until it returns `Some`.
    ///
    /// Outputs after the first decisive one are never computed, so queries
    /// with unbounded output still terminate.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Runtime`] if evaluation panics.
    pub fn find_map<T>(
        &self,
        input: &Value,
        mut visit: impl FnMut(Result<Value, QueryError>) -> Option<T>,
    ) -> Result<Option<T>, QueryError> {
        let filter = &self.filter;
        panic::catch_unwind(AssertUnwindSafe(|| {
            let inputs = RcIter::new(core::iter::empty());
            filter
                .run((Ctx::new([], &inputs), Val::from(input.clone())))
                .find_map(|output| {
                    visit(
                        output
                            .map(Value::from)
                            .map_err(|e| QueryError::runtime(e.to_string())),
                    )
                })
        }))
        .map_err(|_| QueryError::runtime(format!("query '{}' aborted", self.source)))
    }

    /// The original query text.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Query").field(&self.source).finish()
    }
}

/// Byte offset of `part` inside `source`, or the end when it points elsewhere.
fn offset_of(source: &str, part: &str) -> usize {
    let start = source.as_ptr() as usize;
    let at = part.as_ptr() as usize;
    if at >= start && at <= start + source.len() {
        at - start
    } else {
        source.len()
    }
}

fn load_error(source: &str, errors: Vec<(File<&str, ()>, load::Error<&str>)>) -> QueryError {
    for (_, error) in errors {
        match error {
            load::Error::Lex(lex) => {
                if let Some((expected, found)) = lex.first() {
                    return QueryError::parse(
                        offset_of(source, found),
                        format!("expected {}", expected.as_str()),
                    );
                }
            }
            load::Error::Parse(parse) => {
                if let Some((expected, found)) = parse.first() {
                    return QueryError::parse(
                        offset_of(source, found),
                        format!("expected {}", expected.as_str()),
                    );
                }
            }
            _ => {}
        }
    }
    QueryError::parse(0, "invalid query")
}

fn compile_error(
    source: &str,
    errors: Vec<(File<&str, ()>, Vec<(&str, Undefined)>)>,
) -> QueryError {
    errors
        .into_iter()
        .flat_map(|(_, undefined)| undefined)
        .next()
        .map(|(name, undefined)| {
            let message = match undefined {
                Undefined::Filter(arity) => format!("{}/{} is not defined", name, arity),
                _ => format!("{} is not defined", name),
            };
            QueryError::parse(offset_of(source, name), message)
        })
        .unwrap_or_else(|| QueryError::parse(0, "invalid query"))
}

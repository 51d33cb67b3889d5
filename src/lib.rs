//! Resolve templated, parameterized SQL fragments into concrete,
//! executable SQL text.
//!
//! Converted mapper files carry an XML-embedded directive dialect over
//! bind-style placeholders. This crate evaluates those directives against
//! a parameter environment, substitutes sample values for every marker,
//! and can pull balanced function-call and `CASE...END` spans back out of
//! the result for targeted repair. Resolution is best-effort by design:
//! content problems degrade to usable SQL plus an anomaly list, and only
//! catalog persistence can fail.
//!
//! ```no_run
//! use dynsql::catalog::ParameterCatalog;
//! use dynsql::eval::DirectiveEvaluator;
//!
//! # fn main() -> dynsql::error::DynSqlResult<()> {
//! let mut catalog = ParameterCatalog::load("parameter_catalog.json")?;
//! let evaluator = DirectiveEvaluator::new();
//!
//! let template = r#"SELECT * FROM t <where>
//!     <if test="status != null">AND status = #{status,jdbcType=VARCHAR}</if>
//! </where>"#;
//!
//! let resolution = evaluator.resolve(&mut catalog, template);
//! println!("{}", resolution.sql);
//! catalog.flush()?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod cleanup;
pub mod error;
pub mod eval;
pub mod extract;
pub mod token;

pub use eval::{DirectiveEvaluator, Resolution};

/// Resolve one template with a throwaway in-memory catalog.
pub fn resolve(template: &str) -> Resolution {
    let mut catalog = catalog::ParameterCatalog::in_memory();
    DirectiveEvaluator::new().resolve(&mut catalog, template)
}

pub mod prelude {
    pub use crate::catalog::{ParameterCatalog, ParameterRef, SampleValue, ValueCategory};
    pub use crate::cleanup::{finalize, normalize};
    pub use crate::error::{DynSqlError, DynSqlResult};
    pub use crate::eval::{
        Anomaly, AnomalyKind, DirectiveEvaluator, ParameterEnv, Resolution,
    };
    pub use crate::extract::cast::repair_cast;
    pub use crate::extract::{ConstructExtractor, ParsedConstruct};
    pub use crate::token::{SqlTokenizer, Token, TokenKind};
}

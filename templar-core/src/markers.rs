//! Marker vocabulary
//!
//! Markers only have meaning to the rewriter: block markers select which
//! `with` bodies survive in a variant, call markers are translated into
//! `await` or `yield from`. The runtime objects installed under the same
//! names are inert, apart from the call markers which refuse to run
//! untranslated.

use crate::error::{Result, TransfunctionError};
use crate::transformer::VariantRequest;
use std::any::Any;
use std::sync::Arc;
use templar_lang::ast::{Constant, Expr, ExprKind, WithItem};
use templar_lang::{Args, HostObject, Interpreter, RunResult, Value};
use templar_types::FunctionKind;

pub const SYNC_CONTEXT: &str = "sync_context";
pub const ASYNC_CONTEXT: &str = "async_context";
pub const GENERATOR_CONTEXT: &str = "generator_context";
pub const VARIANT_CONTEXT: &str = "variant_context";
pub const PATCH_CONTEXT: &str = "patch_context";
pub const AWAIT_IT: &str = "await_it";
pub const YIELD_FROM_IT: &str = "yield_from_it";

/// Block marker selecting statements for one function kind
pub fn kind_marker(kind: FunctionKind) -> &'static str {
    match kind {
        FunctionKind::Plain => SYNC_CONTEXT,
        FunctionKind::Coroutine => ASYNC_CONTEXT,
        FunctionKind::Generator => GENERATOR_CONTEXT,
    }
}

fn marker_kind(name: &str) -> Option<FunctionKind> {
    match name {
        SYNC_CONTEXT => Some(FunctionKind::Plain),
        ASYNC_CONTEXT => Some(FunctionKind::Coroutine),
        GENERATOR_CONTEXT => Some(FunctionKind::Generator),
        _ => None,
    }
}

/// What a `with` statement made of markers selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockMarker {
    /// `with sync_context:` and friends; several may share one statement
    Kinds(Vec<FunctionKind>),
    /// `with variant_context("name"):`
    Variant(String),
    /// `with patch_context("name", variants=[...]):`
    Patch {
        name: String,
        variants: Option<Vec<String>>,
    },
}

enum ItemMarker {
    Kind(FunctionKind),
    Variant(String),
    Patch {
        name: String,
        variants: Option<Vec<String>>,
    },
    Foreign,
}

impl BlockMarker {
    /// Classify the items of a `with` statement.
    ///
    /// Returns `None` for statements that only use ordinary context managers.
    pub fn parse(items: &[WithItem]) -> Result<Option<BlockMarker>> {
        let mut kinds = Vec::new();
        let mut named = None;
        let mut foreign = 0;
        for item in items {
            match classify_item(item)? {
                ItemMarker::Kind(kind) => kinds.push(kind),
                ItemMarker::Variant(name) => named = Some((VARIANT_CONTEXT, BlockMarker::Variant(name))),
                ItemMarker::Patch { name, variants } => {
                    named = Some((PATCH_CONTEXT, BlockMarker::Patch { name, variants }))
                }
                ItemMarker::Foreign => foreign += 1,
            }
        }

        if let Some((marker, block)) = named {
            if items.len() > 1 {
                return Err(TransfunctionError::wrong_marker(format!(
                    "The \"{}\" marker must be the only context manager in its \"with\" statement.",
                    marker
                )));
            }
            return Ok(Some(block));
        }
        if kinds.is_empty() {
            return Ok(None);
        }
        if foreign > 0 {
            return Err(TransfunctionError::wrong_marker(
                "Markers cannot be combined with other context managers in one \"with\" statement.",
            ));
        }
        Ok(Some(BlockMarker::Kinds(kinds)))
    }

    /// Whether the block body survives in the requested variant
    pub fn selects(&self, request: &VariantRequest) -> bool {
        match self {
            BlockMarker::Kinds(kinds) => kinds.contains(&request.kind),
            BlockMarker::Variant(name) => request.variant.as_deref() == Some(name.as_str()),
            BlockMarker::Patch { name, variants } => {
                request.patches.contains(name)
                    && match (variants, &request.variant) {
                        (None, _) => true,
                        (Some(allowed), Some(variant)) => allowed.contains(variant),
                        (Some(_), None) => false,
                    }
            }
        }
    }
}

fn classify_item(item: &WithItem) -> Result<ItemMarker> {
    let (name, call) = match &item.context.kind {
        ExprKind::Name(name) => (name.as_str(), None),
        ExprKind::Call { func, args, keywords } => match func.as_name() {
            Some(name) => (name, Some((args, keywords))),
            None => return Ok(ItemMarker::Foreign),
        },
        _ => return Ok(ItemMarker::Foreign),
    };

    let is_marker = marker_kind(name).is_some() || name == VARIANT_CONTEXT || name == PATCH_CONTEXT;
    if is_marker && item.target.is_some() {
        return Err(TransfunctionError::wrong_marker(format!(
            "The \"{}\" marker cannot be used with \"as\".",
            name
        )));
    }

    if let Some(kind) = marker_kind(name) {
        return match call {
            None => Ok(ItemMarker::Kind(kind)),
            Some(_) => Err(TransfunctionError::wrong_marker(format!(
                "The \"{}\" marker must be used without parentheses.",
                name
            ))),
        };
    }

    match (name, call) {
        (VARIANT_CONTEXT, Some((args, keywords))) => match (args.as_slice(), keywords.is_empty()) {
            ([arg], true) => string_literal(arg).map(ItemMarker::Variant).ok_or_else(variant_syntax),
            _ => Err(variant_syntax()),
        },
        (VARIANT_CONTEXT, None) => Err(variant_syntax()),
        (PATCH_CONTEXT, Some((args, keywords))) => {
            let [arg] = args.as_slice() else {
                return Err(patch_syntax());
            };
            let name = string_literal(arg).ok_or_else(patch_syntax)?;
            let variants = match keywords.as_slice() {
                [] => None,
                [keyword] if keyword.name == "variants" => Some(string_list(&keyword.value).ok_or_else(patch_syntax)?),
                _ => return Err(patch_syntax()),
            };
            Ok(ItemMarker::Patch { name, variants })
        }
        (PATCH_CONTEXT, None) => Err(patch_syntax()),
        _ => Ok(ItemMarker::Foreign),
    }
}

fn variant_syntax() -> TransfunctionError {
    TransfunctionError::wrong_marker(format!(
        "The \"{}\" marker can be used with only one positional argument, which must be a string literal.",
        VARIANT_CONTEXT
    ))
}

fn patch_syntax() -> TransfunctionError {
    TransfunctionError::wrong_marker(format!(
        "The \"{}\" marker takes one string literal positional argument and an optional \"variants\" keyword with a list of string literals.",
        PATCH_CONTEXT
    ))
}

fn string_literal(expr: &Expr) -> Option<String> {
    match &expr.kind {
        ExprKind::Constant(Constant::Str(s)) => Some(s.clone()),
        _ => None,
    }
}

fn string_list(expr: &Expr) -> Option<Vec<String>> {
    match &expr.kind {
        ExprKind::List(items) => items.iter().map(string_literal).collect(),
        _ => None,
    }
}

/// Call markers wrapping a single expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMarker {
    AwaitIt,
    YieldFromIt,
}

impl CallMarker {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            AWAIT_IT => Some(CallMarker::AwaitIt),
            YIELD_FROM_IT => Some(CallMarker::YieldFromIt),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CallMarker::AwaitIt => AWAIT_IT,
            CallMarker::YieldFromIt => YIELD_FROM_IT,
        }
    }

    /// The only kind of function in which this marker can be translated
    pub fn target_kind(&self) -> FunctionKind {
        match self {
            CallMarker::AwaitIt => FunctionKind::Coroutine,
            CallMarker::YieldFromIt => FunctionKind::Generator,
        }
    }

    pub fn arity_message(&self) -> String {
        format!("The \"{}\" marker can be used with only one positional argument.", self.name())
    }

    pub fn misplaced_message(&self) -> String {
        format!(
            "The \"{}\" marker can only be used in {} functions.",
            self.name(),
            self.target_kind()
        )
    }

    /// The marker called by `expr`, if it is a marker call
    pub fn of_call(expr: &Expr) -> Option<Self> {
        match &expr.kind {
            ExprKind::Call { func, .. } => func.as_name().and_then(CallMarker::from_name),
            _ => None,
        }
    }
}

/// No-op context manager standing in for block markers at run time
#[derive(Debug)]
struct InertContext {
    marker: &'static str,
}

impl HostObject for InertContext {
    fn type_name(&self) -> &str {
        "marker_context"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn has_method(&self, name: &str) -> bool {
        matches!(name, "__enter__" | "__exit__")
    }

    fn call_method(&self, _interp: &mut Interpreter, name: &str, _args: Args) -> RunResult<Value> {
        match name {
            "__exit__" => Ok(Value::Bool(false)),
            _ => Ok(Value::None),
        }
    }

    fn repr(&self) -> String {
        format!("<marker {}>", self.marker)
    }
}

fn inert(marker: &'static str) -> Value {
    Value::Host(Arc::new(InertContext { marker }))
}

/// Install the runtime stand-ins for every marker
pub(crate) fn install(interp: &Interpreter) {
    for marker in [SYNC_CONTEXT, ASYNC_CONTEXT, GENERATOR_CONTEXT] {
        interp.register(marker, inert(marker));
    }
    interp.register_native(VARIANT_CONTEXT, |_interp, _args| Ok(inert(VARIANT_CONTEXT)));
    interp.register_native(PATCH_CONTEXT, |_interp, _args| Ok(inert(PATCH_CONTEXT)));
    for marker in [CallMarker::AwaitIt, CallMarker::YieldFromIt] {
        interp.register_native(marker.name(), move |_interp, _args| {
            Err(TransfunctionError::wrong_marker(marker.misplaced_message()).into_exception())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use templar_lang::ast::StmtKind;
    use templar_lang::parse_source;

    fn with_items(source: &str) -> Vec<WithItem> {
        let module = parse_source(source).unwrap();
        match module.body.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::With { items, .. }) => items,
            other => panic!("Expected with statement, got {:?}", other),
        }
    }

    fn parse(source: &str) -> Result<Option<BlockMarker>> {
        BlockMarker::parse(&with_items(source))
    }

    fn request(kind: FunctionKind, variant: Option<&str>, patches: &[&str]) -> VariantRequest {
        VariantRequest {
            kind,
            variant: variant.map(str::to_string),
            patches: patches.iter().map(|p| p.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn test_kind_markers() {
        assert_eq!(
            parse("with sync_context:\n    pass\n").unwrap(),
            Some(BlockMarker::Kinds(vec![FunctionKind::Plain]))
        );
        assert_eq!(
            parse("with async_context, generator_context:\n    pass\n").unwrap(),
            Some(BlockMarker::Kinds(vec![FunctionKind::Coroutine, FunctionKind::Generator]))
        );
        assert_eq!(parse("with open_file():\n    pass\n").unwrap(), None);
    }

    #[test]
    fn test_kind_marker_misuse() {
        let err = parse("with sync_context():\n    pass\n").unwrap_err();
        assert_eq!(err.to_string(), "The \"sync_context\" marker must be used without parentheses.");
        let err = parse("with async_context as ctx:\n    pass\n").unwrap_err();
        assert_eq!(err.to_string(), "The \"async_context\" marker cannot be used with \"as\".");
        let err = parse("with sync_context, lock:\n    pass\n").unwrap_err();
        assert!(matches!(err, TransfunctionError::WrongMarkerSyntax(_)));
    }

    #[test]
    fn test_variant_marker() {
        assert_eq!(
            parse("with variant_context('fast'):\n    pass\n").unwrap(),
            Some(BlockMarker::Variant("fast".to_string()))
        );
        for bad in [
            "with variant_context():\n    pass\n",
            "with variant_context('a', 'b'):\n    pass\n",
            "with variant_context(name):\n    pass\n",
            "with variant_context('a', strict=True):\n    pass\n",
            "with variant_context:\n    pass\n",
        ] {
            let err = parse(bad).unwrap_err();
            assert_eq!(
                err.to_string(),
                "The \"variant_context\" marker can be used with only one positional argument, which must be a string literal."
            );
        }
    }

    #[test]
    fn test_patch_marker() {
        assert_eq!(
            parse("with patch_context('logging'):\n    pass\n").unwrap(),
            Some(BlockMarker::Patch {
                name: "logging".to_string(),
                variants: None
            })
        );
        assert_eq!(
            parse("with patch_context('metrics', variants=['a']):\n    pass\n").unwrap(),
            Some(BlockMarker::Patch {
                name: "metrics".to_string(),
                variants: Some(vec!["a".to_string()])
            })
        );
        for bad in [
            "with patch_context('m', variants='a'):\n    pass\n",
            "with patch_context('m', only=['a']):\n    pass\n",
            "with patch_context(1):\n    pass\n",
        ] {
            assert!(matches!(parse(bad), Err(TransfunctionError::WrongMarkerSyntax(_))));
        }
    }

    #[test]
    fn test_selection_table() {
        let plain = request(FunctionKind::Plain, None, &[]);
        let coroutine = request(FunctionKind::Coroutine, None, &[]);
        assert!(BlockMarker::Kinds(vec![FunctionKind::Plain]).selects(&plain));
        assert!(!BlockMarker::Kinds(vec![FunctionKind::Plain]).selects(&coroutine));

        let a = request(FunctionKind::Plain, Some("a"), &["logging"]);
        assert!(BlockMarker::Variant("a".into()).selects(&a));
        assert!(!BlockMarker::Variant("b".into()).selects(&a));

        let restricted = BlockMarker::Patch {
            name: "logging".into(),
            variants: Some(vec!["b".into()]),
        };
        assert!(!restricted.selects(&a));
        let open = BlockMarker::Patch {
            name: "logging".into(),
            variants: None,
        };
        assert!(open.selects(&a));
        assert!(!open.selects(&plain));
    }

    #[test]
    fn test_call_marker_messages() {
        assert_eq!(
            CallMarker::AwaitIt.arity_message(),
            "The \"await_it\" marker can be used with only one positional argument."
        );
        assert_eq!(
            CallMarker::YieldFromIt.misplaced_message(),
            "The \"yield_from_it\" marker can only be used in generator functions."
        );
    }
}

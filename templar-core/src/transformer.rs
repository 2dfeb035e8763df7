//! Variant cache and accessors
//!
//! A [`Transformer`] owns one template function. Each accessor maps to a
//! [`VariantRequest`]; the first request for a given key runs the whole
//! pipeline (source, parse, rewrite, compile, rebuild) and later requests
//! are served from the cache. Concurrent first requests for the same key
//! compile once: the others wait on the same cell.

use crate::config::EngineConfig;
use crate::error::{Result, TransfunctionError};
use crate::namespace::LexicalNamespace;
use crate::rebuild::rebuild;
use crate::rewriter::{closure_wrapper, shift_lines, strip_entry_decorator, Rewriter, WRAPPER_NAME};
use crate::transforms::{ForbidCommonReturns, TreeTransform};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use templar_lang::ast::{FunctionDef, StmtKind};
use templar_lang::{
    compile_module, dedent, parse_source, unparse_module, Args, Function, FunctionKind, Interpreter, Loc,
    ScopeSnapshot, Source, Value,
};
use tracing::{debug, trace};

/// Cache key: which shape of the template to produce
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantRequest {
    pub kind: FunctionKind,
    pub variant: Option<String>,
    pub patches: BTreeSet<String>,
}

impl VariantRequest {
    /// One of the three built-in variants
    pub fn kind(kind: FunctionKind) -> Self {
        Self {
            kind,
            variant: None,
            patches: BTreeSet::new(),
        }
    }

    /// A declared named variant
    pub fn variant(name: impl Into<String>, kind: FunctionKind) -> Self {
        Self {
            kind,
            variant: Some(name.into()),
            patches: BTreeSet::new(),
        }
    }

    pub fn with_patches<I, S>(mut self, patches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patches.extend(patches.into_iter().map(Into::into));
        self
    }
}

/// Where the entry decorator was applied
#[derive(Clone)]
pub struct CallSite {
    /// Line of the decorator application
    pub line: u32,
    /// Name the entry decorator is recognized by
    pub decorator_name: String,
    /// Function and class scopes active at decoration, innermost first
    pub scopes: Vec<ScopeSnapshot>,
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scopes: Vec<&str> = self.scopes.iter().map(ScopeSnapshot::qualname).collect();
        f.debug_struct("CallSite")
            .field("line", &self.line)
            .field("decorator_name", &self.decorator_name)
            .field("scopes", &scopes)
            .finish()
    }
}

/// Factory for the variants of one template function
pub struct Transformer {
    template: Arc<Function>,
    site: CallSite,
    variants: Option<Vec<String>>,
    transforms: Vec<Arc<dyn TreeTransform>>,
    cache: DashMap<VariantRequest, Arc<OnceCell<Arc<Function>>>>,
}

impl Transformer {
    /// Wrap a template.
    ///
    /// Only plain and generator functions qualify; lambdas, coroutine
    /// functions and values that are already wrapped are rejected.
    pub fn wrap(
        template: &Value,
        site: CallSite,
        variants: Option<Vec<String>>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let base = format!(
            "Only regular or generator functions can be used as a template for @{}.",
            site.decorator_name
        );
        let function = match template {
            Value::Function(f) if f.is_lambda() => {
                return Err(TransfunctionError::InvalidTemplate(format!("{} Don't use lambdas here.", base)))
            }
            Value::Function(f) if f.kind() == FunctionKind::Coroutine => {
                return Err(TransfunctionError::InvalidTemplate(format!(
                    "{} You can't use async functions.",
                    base
                )))
            }
            Value::Function(f) => f.clone(),
            Value::Host(host) if crate::decorator::is_transformer(host.as_ref()) => {
                return Err(TransfunctionError::DualUseOfDecorator(format!(
                    "You cannot use the '{}' decorator twice for the same function.",
                    site.decorator_name
                )))
            }
            _ => return Err(TransfunctionError::InvalidTemplate(base)),
        };

        let mut transforms: Vec<Arc<dyn TreeTransform>> = Vec::new();
        if config.strict_async_returns {
            transforms.push(Arc::new(ForbidCommonReturns));
        }

        debug!(template = %function.qualname, line = site.line, "wrapped template");
        Ok(Self {
            template: function,
            site,
            variants,
            transforms,
            cache: DashMap::new(),
        })
    }

    /// Run `transform` on every variant produced from now on
    pub fn with_transform(mut self, transform: Arc<dyn TreeTransform>) -> Self {
        self.transforms.push(transform);
        self
    }

    /// The wrapped template function
    pub fn template(&self) -> &Arc<Function> {
        &self.template
    }

    pub fn site(&self) -> &CallSite {
        &self.site
    }

    /// Declared named variants, if any were declared
    pub fn variants(&self) -> Option<&[String]> {
        self.variants.as_deref()
    }

    /// Number of distinct variants compiled so far
    pub fn cached(&self) -> usize {
        self.cache.iter().filter(|entry| entry.value().get().is_some()).count()
    }

    /// The transformer itself is a factory and cannot be called
    pub fn call(&self) -> Result<Value> {
        Err(TransfunctionError::CallTransfunctionDirectly)
    }

    pub fn get_usual_function(&self, interp: &mut Interpreter) -> Result<Arc<Function>> {
        self.get(interp, &VariantRequest::kind(FunctionKind::Plain))
    }

    pub fn get_async_function(&self, interp: &mut Interpreter) -> Result<Arc<Function>> {
        self.get(interp, &VariantRequest::kind(FunctionKind::Coroutine))
    }

    pub fn get_generator_function(&self, interp: &mut Interpreter) -> Result<Arc<Function>> {
        self.get(interp, &VariantRequest::kind(FunctionKind::Generator))
    }

    /// A declared named variant with a set of active patches
    pub fn get_variant_function<I, S>(
        &self,
        interp: &mut Interpreter,
        name: &str,
        patches: I,
        kind: FunctionKind,
    ) -> Result<Arc<Function>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.get(interp, &VariantRequest::variant(name, kind).with_patches(patches))
    }

    /// Produce the variant for `request`, compiling it on first use
    pub fn get(&self, interp: &mut Interpreter, request: &VariantRequest) -> Result<Arc<Function>> {
        if let Some(name) = &request.variant {
            self.check_variant(name)?;
        }

        let cell = self.cache.entry(request.clone()).or_default().clone();
        if let Some(function) = cell.get() {
            debug!(
                template = %self.template.qualname,
                kind = %request.kind,
                variant = ?request.variant,
                patches = ?request.patches,
                "serving cached variant"
            );
            return Ok(function.clone());
        }
        let function = cell.get_or_try_init(|| self.compile(interp, request))?;
        Ok(function.clone())
    }

    fn check_variant(&self, name: &str) -> Result<()> {
        let declared = self.variants.as_deref().unwrap_or_default();
        if declared.iter().any(|v| v == name) {
            return Ok(());
        }
        let listed: Vec<String> = declared.iter().map(|v| format!("\"{}\"", v)).collect();
        Err(TransfunctionError::UnknownVariant(format!(
            "Unknown variant \"{}\". Declared variants: [{}].",
            name,
            listed.join(", ")
        )))
    }

    fn compile(&self, interp: &mut Interpreter, request: &VariantRequest) -> Result<Arc<Function>> {
        debug!(
            template = %self.template.qualname,
            kind = %request.kind,
            variant = ?request.variant,
            patches = ?request.patches,
            "compiling variant"
        );

        let TemplateSource {
            mut definition,
            loc,
            offset,
            source,
        } = TemplateSource::acquire(&self.template)?;

        let call_line = self.site.line.saturating_sub(offset);
        strip_entry_decorator(&mut definition, &self.site.decorator_name, call_line)?;

        Rewriter::new(request)
            .with_transforms(&self.transforms)
            .with_line_offset(offset)
            .rewrite(&mut definition)?;

        let mut module = closure_wrapper(definition, loc, &self.template.code.freevars);
        shift_lines(&mut module.body, offset);
        trace!(source = %unparse_module(&module), "generated variant source");

        let raw = self.materialize(interp, &module, source)?;
        rebuild(&raw, &self.template)
    }

    /// Compile and run the wrapper module, then call the wrapper to get
    /// the variant closing over placeholder cells
    fn materialize(
        &self,
        interp: &mut Interpreter,
        module: &templar_lang::Module,
        source: Option<Arc<Source>>,
    ) -> Result<Arc<Function>> {
        let code = compile_module(module, source, &self.template.code.filename)?;
        let namespace = Arc::new(LexicalNamespace::new(
            self.site.scopes.clone(),
            self.template.globals.clone(),
            interp.builtins().clone(),
        ));
        interp.exec_code(&code, namespace.clone())?;

        let wrapper = namespace.resolve(WRAPPER_NAME)?;
        match interp.call(&wrapper, Args::default())? {
            Value::Function(function) => Ok(function),
            other => Err(TransfunctionError::WrongTransfunctionSyntax(format!(
                "The generated wrapper returned {} instead of a function.",
                other.type_name()
            ))),
        }
    }
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer")
            .field("template", &self.template.qualname)
            .field("site", &self.site)
            .field("variants", &self.variants)
            .field("transforms", &self.transforms)
            .field("cached", &self.cached())
            .finish()
    }
}

/// A template's definition tree and how its lines map to the source
struct TemplateSource {
    definition: FunctionDef,
    /// Location of the `def` statement in tree numbering
    loc: Loc,
    /// Tree line + offset = source line
    offset: u32,
    source: Option<Arc<Source>>,
}

impl TemplateSource {
    /// Re-read the template's source text, falling back to the definition
    /// tree retained by code compiled without source
    fn acquire(template: &Function) -> Result<Self> {
        let code = &template.code;
        if let Some(source) = &code.source {
            let text = source.lines(code.first_line, code.last_line).ok_or_else(|| {
                TransfunctionError::SourceUnavailable(format!(
                    "Lines {}-{} of '{}' are not available for template '{}'.",
                    code.first_line,
                    code.last_line,
                    source.name(),
                    template.qualname
                ))
            })?;
            let module = parse_source(&dedent(&text))?;
            let stmt = module.body.into_iter().next();
            return match stmt.map(|s| (s.loc, s.kind)) {
                Some((loc, StmtKind::FunctionDef(def))) if def.name == code.name => Ok(Self {
                    definition: *def,
                    loc,
                    offset: code.first_line.saturating_sub(1),
                    source: Some(source.clone()),
                }),
                _ => Err(TransfunctionError::SourceUnavailable(format!(
                    "Could not find the definition of '{}' in '{}'.",
                    template.qualname,
                    source.name()
                ))),
            };
        }

        if let Some(definition) = &code.definition {
            return Ok(Self {
                definition: (**definition).clone(),
                loc: Loc::new(definition.first_line, 1),
                offset: 0,
                source: None,
            });
        }

        Err(TransfunctionError::SourceUnavailable(format!(
            "Could not get the source code of template '{}'.",
            template.qualname
        )))
    }
}

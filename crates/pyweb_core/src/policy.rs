//! Capability policy: allow-listed builtins, per-origin module and
//! network rules, and resource ceilings.
//!
//! The policy is pure data and decisions; the engine's sandbox module
//! materializes it into a guest namespace. The allow-lists are the
//! authoritative control. The textual pre-filter exists as
//! defense-in-depth only and is known to have false positives and
//! negatives.

use hashbrown::{HashMap, HashSet};

use crate::origin::ScriptOrigin;

/// Builtin names copied into a sandboxed namespace. Everything else is
/// simply absent, so referencing it fails with an ordinary NameError.
/// `__build_class__` and `__import__` are required for class statements
/// and import statements to work at all; `__import__` is installed as a
/// checking wrapper, never the real one.
pub const SAFE_BUILTINS: &[&str] = &[
    // Core language/runtime support
    "__build_class__",
    "__import__",
    "object",
    "type",
    "super",
    // Exception types needed for try/except
    "BaseException",
    "Exception",
    "TypeError",
    "ValueError",
    "ZeroDivisionError",
    "ArithmeticError",
    "AttributeError",
    "IndexError",
    "KeyError",
    "LookupError",
    "NameError",
    "RuntimeError",
    "StopIteration",
    // Pure, side-effect-free helpers
    "abs",
    "all",
    "any",
    "bin",
    "bool",
    "bytearray",
    "bytes",
    "callable",
    "chr",
    "complex",
    "dict",
    "dir",
    "divmod",
    "enumerate",
    "filter",
    "float",
    "format",
    "frozenset",
    "hash",
    "hex",
    "id",
    "int",
    "isinstance",
    "issubclass",
    "iter",
    "len",
    "list",
    "map",
    "max",
    "min",
    "next",
    "oct",
    "ord",
    "pow",
    "range",
    "repr",
    "reversed",
    "round",
    "set",
    "slice",
    "sorted",
    "str",
    "sum",
    "tuple",
    "zip",
    "print",
    // Decorators
    "property",
    "classmethod",
    "staticmethod",
];

/// Literal substrings that fail the textual pre-filter. Textual, not
/// semantic: `# eval(` in a comment trips it, while an aliased escape
/// does not. The namespace allow-list is what actually holds.
pub const DANGEROUS_PATTERNS: &[&str] = &[
    "eval(",
    "exec(",
    "globals(",
    "locals(",
    "getattr(",
    "setattr(",
    "delattr(",
    "open(",
    "compile(",
    "input(",
    "subprocess",
    "ctypes",
    "os.system",
    "sys.modules",
    "importlib",
    "__import__",
    "__class__",
    "__bases__",
    "__subclasses__",
    "builtins.__dict__",
];

/// Module imports permitted for origins without a specific profile.
pub const DEFAULT_ALLOWED_MODULES: &[&str] = &[
    "math",
    "random",
    "statistics",
    "datetime",
    "json",
    "collections",
    "functools",
    "itertools",
    "operator",
    "string",
    "re",
    "time",
    "asyncio",
    "decimal",
    "pathlib",
];

pub const DEFAULT_SAFE_DOMAINS: &[&str] = &["localhost", "127.0.0.1", "0.0.0.0"];

const DEFAULT_ORIGIN_KEY: &str = "default";

/// Per-origin execution ceilings. Exceeding any of them terminates the
/// running script with a ResourceExceeded error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_memory_bytes: u64,
    pub max_cpu_time_ms: u64,
    pub max_recursion_depth: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        ResourceLimits {
            max_memory_bytes: 100 * 1024 * 1024,
            max_cpu_time_ms: 5000,
            max_recursion_depth: 100,
        }
    }
}

/// Process-lifetime policy tables, shared across all executions. The
/// engine guards mutation with the execution-lock discipline.
pub struct SecurityPolicy {
    default_modules: HashSet<String>,
    origin_allowed_modules: HashMap<String, HashSet<String>>,
    origin_limits: HashMap<String, ResourceLimits>,
    safe_domains: HashSet<String>,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityPolicy {
    pub fn new() -> Self {
        let mut origin_limits = HashMap::new();
        origin_limits.insert(DEFAULT_ORIGIN_KEY.to_string(), ResourceLimits::default());

        SecurityPolicy {
            default_modules: DEFAULT_ALLOWED_MODULES
                .iter()
                .map(|m| m.to_string())
                .collect(),
            origin_allowed_modules: HashMap::new(),
            origin_limits,
            safe_domains: DEFAULT_SAFE_DOMAINS.iter().map(|d| d.to_string()).collect(),
        }
    }

    /// A module is importable iff it equals an allowed name or starts
    /// with `allowed_name + "."`. Never a bare-prefix substring match:
    /// allowing `math` does not allow `mathlib`.
    pub fn should_allow_module_import(&self, module_name: &str, origin: &ScriptOrigin) -> bool {
        self.allowed_modules(origin).iter().any(|allowed| {
            module_name == allowed
                || (module_name.len() > allowed.len()
                    && module_name.starts_with(allowed.as_str())
                    && module_name.as_bytes()[allowed.len()] == b'.')
        })
    }

    /// Textual pre-filter over the raw source. Defense-in-depth only.
    pub fn is_code_safe(source: &str) -> bool {
        !DANGEROUS_PATTERNS
            .iter()
            .any(|pattern| source.contains(pattern))
    }

    pub fn should_allow_script_execution(&self, source: &str, _origin: &ScriptOrigin) -> bool {
        Self::is_code_safe(source)
    }

    /// Same-origin requests are always allowed; cross-origin targets
    /// must match the safe-domain set exactly or via a `*.` suffix.
    pub fn should_allow_network_request(
        &self,
        target: &ScriptOrigin,
        origin: &ScriptOrigin,
    ) -> bool {
        if target.same_origin(origin) {
            return true;
        }
        self.safe_domains
            .iter()
            .any(|domain| host_matches(target.host(), domain))
    }

    pub fn limits_for(&self, origin: &ScriptOrigin) -> ResourceLimits {
        self.origin_limits
            .get(&origin.policy_key())
            .or_else(|| self.origin_limits.get(DEFAULT_ORIGIN_KEY))
            .copied()
            .unwrap_or_default()
    }

    pub fn allowed_modules(&self, origin: &ScriptOrigin) -> &HashSet<String> {
        self.origin_allowed_modules
            .get(&origin.policy_key())
            .unwrap_or(&self.default_modules)
    }

    pub fn set_origin_allowed_modules(
        &mut self,
        origin: &ScriptOrigin,
        modules: impl IntoIterator<Item = String>,
    ) {
        self.origin_allowed_modules
            .insert(origin.policy_key(), modules.into_iter().collect());
    }

    pub fn set_origin_resource_limits(&mut self, origin: &ScriptOrigin, limits: ResourceLimits) {
        self.origin_limits.insert(origin.policy_key(), limits);
    }

    pub fn add_safe_domain(&mut self, domain: impl Into<String>) {
        self.safe_domains.insert(domain.into());
    }
}

/// Exact host match, or `*.suffix` pattern matching any strict subdomain.
fn host_matches(host: &str, pattern: &str) -> bool {
    if host == pattern {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix("*.") {
        // Dot boundary required: `*.cdn.test` must not match `evilcdn.test`.
        return host
            .strip_suffix(suffix)
            .is_some_and(|head| head.ends_with('.'));
    }
    false
}

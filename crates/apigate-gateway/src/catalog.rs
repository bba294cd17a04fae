//! Built-in [`MessageLocalizer`] implementation.

use apigate_kernel::gateway::MessageLocalizer;
use std::collections::{HashMap, HashSet};

/// Language codes the gateway will render in.
const LANGUAGES: &[&str] = &[
    "en", "de", "es", "fr", "it", "ja", "nl", "pl", "pt", "ru", "sv", "zh",
];

const EN: &[(&str, &str)] = &[
    ("apierror-missingparam", "The \"$1\" parameter must be set."),
    ("apierror-unrecognizedvalue", "Unrecognized value for parameter \"$1\": $2."),
    ("apierror-badinteger", "Invalid value \"$2\" for integer parameter \"$1\"."),
    ("apierror-badtoken", "Invalid CSRF token."),
    ("apierror-mustbeposted", "The \"$1\" module requires a POST request."),
    ("apierror-readapidenied", "You need read permission to use this module."),
    ("apierror-noapiwrite", "Editing of this wiki through the API is disabled."),
    ("apierror-writeapidenied", "You're not allowed to edit this wiki through the API."),
    (
        "apierror-promised-nonwrite-api",
        "The \"Promise-Non-Write-API-Action\" HTTP header cannot be sent to write-mode API modules.",
    ),
    (
        "apierror-assertuserfailed",
        "You are no longer logged in, so the action could not be completed.",
    ),
    (
        "apierror-assertanonfailed",
        "You are no longer logged out, so the action could not be completed.",
    ),
    (
        "apierror-assertbotfailed",
        "You do not have the <code>bot</code> right, so the action could not be completed.",
    ),
    (
        "apierror-assertnameduserfailed",
        "You are no longer logged in as \"$1\", so the action could not be completed.",
    ),
    ("apierror-maxlag", "Waiting for $2: $1 seconds lagged."),
    ("apierror-maxlag-generic", "Waiting for a database server: $1 seconds lagged."),
    (
        "apierror-mismatchedorigin",
        "The \"origin\" parameter value \"$1\" does not match the <code>Origin</code> request header.",
    ),
    ("apierror-badcallback", "Invalid callback name \"$1\"."),
    ("apierror-internal-detailed", "[$1] Exception caught: $2"),
    ("apierror-internal-generic", "[$1] Caught exception of type $2"),
    ("apiwarn-unsupportedarray", "Parameter \"$1\" uses unsupported PHP array syntax."),
    ("apiwarn-unrecognizedparams", "Unrecognized parameters: $1."),
    ("apiwarn-unrecognizedvalues", "Unrecognized value for parameter \"$1\": $2."),
    ("api-usage-docref", "See $1 for API usage."),
];

const FR: &[(&str, &str)] = &[
    ("apierror-missingparam", "Le paramètre « $1 » doit être défini."),
    ("apierror-badtoken", "Jeton CSRF non valide."),
    (
        "apierror-assertuserfailed",
        "Vous n’êtes plus connecté(e), l’action n’a donc pas pu être effectuée.",
    ),
    ("apiwarn-unrecognizedparams", "Paramètres non reconnus : $1."),
    ("api-usage-docref", "Voir $1 pour l’utilisation de l’API."),
];

const DE: &[(&str, &str)] = &[
    ("apierror-missingparam", "Der Parameter „$1“ muss gesetzt sein."),
    ("apiwarn-unrecognizedparams", "Nicht erkannte Parameter: $1."),
];

/// Shipped messages for a few languages plus site-local overrides.
///
/// Overrides are only consulted when a lookup asks for them.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    shipped: HashMap<String, HashMap<String, String>>,
    local: HashMap<String, HashMap<String, String>>,
    languages: HashSet<String>,
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticCatalog {
    pub fn new() -> Self {
        let mut shipped = HashMap::new();
        for (lang, table) in [("en", EN), ("fr", FR), ("de", DE)] {
            shipped.insert(
                lang.to_string(),
                table
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            );
        }
        Self {
            shipped,
            local: HashMap::new(),
            languages: LANGUAGES.iter().map(|l| l.to_string()).collect(),
        }
    }

    /// Builder: add a site-local override.
    pub fn with_local_message(
        mut self,
        language: impl Into<String>,
        key: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.local
            .entry(language.into())
            .or_default()
            .insert(key.into(), text.into());
        self
    }

    /// Supported language codes, sorted.
    pub fn languages(&self) -> Vec<String> {
        let mut languages: Vec<_> = self.languages.iter().cloned().collect();
        languages.sort();
        languages
    }
}

impl MessageLocalizer for StaticCatalog {
    fn lookup(&self, key: &str, language: &str, use_database: bool) -> Option<String> {
        let local = use_database
            .then(|| self.local.get(language).and_then(|t| t.get(key)))
            .flatten();
        local
            .or_else(|| self.shipped.get(language).and_then(|t| t.get(key)))
            .cloned()
    }

    fn is_valid_language(&self, language: &str) -> bool {
        self.languages.contains(language)
    }
}

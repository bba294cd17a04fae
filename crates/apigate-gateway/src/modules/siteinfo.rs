//! `action=siteinfo`: static site metadata, publicly cacheable.
//!
//! `siprop` selects properties, separated by `|`: `general` (default) and
//! `languages`. The module supports conditional requests: the etag and
//! last-modified time both derive from when the metadata was built.

use apigate_kernel::config::GatewaySettings;
use apigate_kernel::gateway::{
    ApiMessage, ApiModule, ApiRequest, CacheMode, ConditionalKind, ConditionalValue,
    ModuleContext, ModuleError,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Site metadata snapshot shared by every `siteinfo` instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteInfo {
    pub name: String,
    pub content_language: String,
    pub languages: Vec<String>,
    pub write_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl SiteInfo {
    pub fn from_settings(
        settings: &GatewaySettings,
        languages: Vec<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: settings.site_name.clone(),
            content_language: settings.content_language.clone(),
            languages,
            write_enabled: settings.enable_write,
            updated_at,
        }
    }

    fn etag(&self) -> String {
        format!("W/\"siteinfo-{}\"", self.updated_at.timestamp())
    }
}

pub struct SiteInfoModule {
    site: Arc<SiteInfo>,
}

impl SiteInfoModule {
    pub fn new(site: Arc<SiteInfo>) -> Self {
        Self { site }
    }

    fn general(&self) -> Value {
        json!({
            "sitename": self.site.name,
            "lang": self.site.content_language,
            "writeapi": self.site.write_enabled,
            "time": self.site.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }
}

impl ApiModule for SiteInfoModule {
    fn module_name(&self) -> &str {
        "siteinfo"
    }

    fn conditional_request_data(
        &self,
        kind: ConditionalKind,
        _request: &ApiRequest,
    ) -> Option<ConditionalValue> {
        match kind {
            ConditionalKind::ETag => Some(ConditionalValue::ETag(self.site.etag())),
            ConditionalKind::LastModified => {
                Some(ConditionalValue::LastModified(self.site.updated_at))
            }
        }
    }

    fn execute(&self, ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let props = ctx.param("siprop").unwrap_or("general");

        let mut out = Map::new();
        let mut unknown = Vec::new();
        for prop in props.split('|').map(str::trim).filter(|p| !p.is_empty()) {
            match prop {
                "general" => {
                    out.insert("general".into(), self.general());
                }
                "languages" => {
                    out.insert("languages".into(), json!(self.site.languages));
                }
                other => unknown.push(other.to_string()),
            }
        }
        if !unknown.is_empty() {
            ctx.add_warning(ApiMessage::new(
                "unrecognizedvalues",
                "apiwarn-unrecognizedvalues",
                ["siprop".to_string(), unknown.join(", ")],
            ));
        }

        ctx.add_value("query", Value::Object(out))?;
        ctx.set_cache_mode(CacheMode::Public);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apigate_kernel::gateway::{CallerIdentity, HttpMethod, MessageLog, ParamReader};
    use chrono::TimeZone;

    fn module() -> SiteInfoModule {
        SiteInfoModule::new(Arc::new(SiteInfo {
            name: "Apigate".into(),
            content_language: "en".into(),
            languages: vec!["en".into(), "fr".into()],
            write_enabled: true,
            updated_at: Utc.with_ymd_and_hms(2019, 1, 2, 3, 4, 5).unwrap(),
        }))
    }

    fn run(req: ApiRequest) -> (Map<String, Value>, Option<CacheMode>, MessageLog) {
        let caller = req.caller.clone();
        let mut params = ParamReader::new();
        let mut log = MessageLog::new();
        let mut ctx = ModuleContext::new("siteinfo", &req, &caller, &mut params, &mut log);
        module().execute(&mut ctx).unwrap();
        let output = ctx.into_output();
        (output.sections, output.cache_mode, log)
    }

    fn get() -> ApiRequest {
        ApiRequest::new("r1", HttpMethod::Get, CallerIdentity::anonymous(["read"]))
    }

    #[test]
    fn default_props_are_general() {
        let (sections, cache_mode, log) = run(get());
        assert_eq!(sections["query"]["general"]["sitename"], "Apigate");
        assert_eq!(sections["query"]["general"]["time"], "2019-01-02T03:04:05Z");
        assert!(sections["query"].get("languages").is_none());
        assert_eq!(cache_mode, Some(CacheMode::Public));
        assert!(log.warnings().is_empty());
    }

    #[test]
    fn unknown_props_warn() {
        let (sections, _, log) = run(get().with_param("siprop", "languages|bogus"));
        assert_eq!(sections["query"]["languages"], json!(["en", "fr"]));
        assert_eq!(log.warnings()[0].message.code, "unrecognizedvalues");
    }

    #[test]
    fn array_syntax_falls_back_to_default() {
        let (sections, _, log) = run(get().with_array_param("siprop"));
        assert!(sections["query"].get("general").is_some());
        assert_eq!(log.warnings()[0].message.code, "unsupportedarray");
    }

    #[test]
    fn conditional_metadata() {
        let m = module();
        assert_eq!(
            m.conditional_request_data(ConditionalKind::ETag, &get()),
            Some(ConditionalValue::ETag("W/\"siteinfo-1546398245\"".into()))
        );
        assert!(matches!(
            m.conditional_request_data(ConditionalKind::LastModified, &get()),
            Some(ConditionalValue::LastModified(_))
        ));
    }
}

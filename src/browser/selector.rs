use std::fmt;

use crate::error::{BotError, Result};

/// Engine-tagged element selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    XPath(String),
    Css(String),
}

impl Selector {
    /// Pick a selector from optional xpath and css queries.
    ///
    /// Xpath wins when both are given; empty strings count as absent.
    pub fn resolve(xpath: Option<&str>, css: Option<&str>) -> Result<Self> {
        let non_empty = |s: Option<&str>| s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

        if let Some(xpath) = non_empty(xpath) {
            return Ok(Selector::XPath(xpath));
        }
        if let Some(css) = non_empty(css) {
            return Ok(Selector::Css(css));
        }
        Err(BotError::Configuration(
            "either an xpath or a css selector must be provided".to_string(),
        ))
    }

    /// Parse the `xpath=...` / `css=...` form; a bare query is treated as css
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if let Some(query) = spec.strip_prefix("xpath=") {
            Self::resolve(Some(query), None)
        } else if let Some(query) = spec.strip_prefix("css=") {
            Self::resolve(None, Some(query))
        } else {
            Self::resolve(None, Some(spec))
        }
    }

    pub fn query(&self) -> &str {
        match self {
            Selector::XPath(q) | Selector::Css(q) => q,
        }
    }

    /// Script that finds the xpath match and stamps it with `marker` so it can be
    /// fetched back through a css attribute selector. Evaluates to whether a node was found.
    pub(crate) fn xpath_marker_script(xpath: &str, marker: &str) -> String {
        format!(
            r#"(() => {{
                const node = document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
                if (!node || node.nodeType !== Node.ELEMENT_NODE) return false;
                node.setAttribute('data-stepwright-id', {});
                return true;
            }})()"#,
            js_string(xpath),
            js_string(marker)
        )
    }

    pub(crate) fn marker_css(marker: &str) -> String {
        format!(r#"[data-stepwright-id="{}"]"#, marker)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::XPath(q) => write!(f, "xpath={}", q),
            Selector::Css(q) => write!(f, "css={}", q),
        }
    }
}

/// Quote a value as a JavaScript string literal
pub(crate) fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xpath_takes_precedence() {
        let sel = Selector::resolve(Some("//button"), Some("#go")).unwrap();
        assert_eq!(sel, Selector::XPath("//button".to_string()));
        assert_eq!(sel.to_string(), "xpath=//button");
    }

    #[test]
    fn test_empty_counts_as_absent() {
        let sel = Selector::resolve(Some(""), Some("#go")).unwrap();
        assert_eq!(sel.to_string(), "css=#go");
        assert!(matches!(
            Selector::resolve(Some(" "), None),
            Err(BotError::Configuration(_))
        ));
        assert!(matches!(Selector::resolve(None, None), Err(BotError::Configuration(_))));
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(Selector::parse("xpath=//a[@id='x']").unwrap(), Selector::XPath("//a[@id='x']".into()));
        assert_eq!(Selector::parse("css=.btn").unwrap(), Selector::Css(".btn".into()));
        assert_eq!(Selector::parse("input[name=q]").unwrap(), Selector::Css("input[name=q]".into()));
        assert!(Selector::parse("xpath=").is_err());
    }

    #[test]
    fn test_marker_script_escapes_quotes() {
        let script = Selector::xpath_marker_script(r#"//a[text()="Go"]"#, "m-1");
        assert!(script.contains(r#""//a[text()=\"Go\"]""#));
        assert!(script.contains(r#"'data-stepwright-id', "m-1""#));
        assert_eq!(Selector::marker_css("m-1"), r#"[data-stepwright-id="m-1"]"#);
    }
}

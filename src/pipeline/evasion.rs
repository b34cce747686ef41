//! Declarative browser-fingerprint overrides for the rendered fetch.
//!
//! An [`EvasionProfile`] is plain data: which navigator properties to
//! override and with what values. [`EvasionProfile::to_init_script`] renders
//! it into one JavaScript snippet that the browser session registers with
//! `Page.addScriptToEvaluateOnNewDocument` before any navigation, so every
//! frame of every document sees the overrides before its own scripts run.
//!
//! The same profile also carries the request identity (User-Agent and extra
//! headers) applied to each isolated browser context.

use serde::Serialize;
use std::fmt::Write as _;

/// Desktop Chrome on Windows; shared by the fast fetch and the browser.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// One entry of the fake `navigator.plugins` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FakePlugin {
    pub name: String,
    pub filename: String,
    pub description: String,
    #[serde(rename = "mimeTypes")]
    pub mime_types: Vec<FakeMimeType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FakeMimeType {
    #[serde(rename = "type")]
    pub mime: String,
    pub suffixes: String,
    pub description: String,
}

/// Random-walk pointer position kept alive inside the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseJitter {
    pub interval_ms: u32,
    /// Maximum step per axis per tick, in CSS pixels.
    pub amplitude_px: u32,
}

/// The full set of fingerprint overrides applied to a browser context.
#[derive(Debug, Clone, PartialEq)]
pub struct EvasionProfile {
    pub user_agent: String,
    /// Sent with every request of the context.
    pub extra_headers: Vec<(String, String)>,
    pub hide_webdriver: bool,
    pub chrome_runtime_stub: bool,
    /// Answer `permissions.query({name: 'notifications'})` from
    /// `Notification.permission` and make the patched function report
    /// native code from `toString()`.
    pub patch_permissions_query: bool,
    pub plugins: Vec<FakePlugin>,
    pub languages: Vec<String>,
    pub platform: String,
    pub hardware_concurrency: u32,
    pub device_memory_gb: u32,
    /// Force `navigator.webdriver = false` inside iframe windows.
    pub patch_iframe_webdriver: bool,
    pub mouse_jitter: Option<MouseJitter>,
}

impl Default for EvasionProfile {
    fn default() -> Self {
        let header = |k: &str, v: &str| (k.to_string(), v.to_string());
        Self {
            user_agent: USER_AGENT.to_string(),
            extra_headers: vec![
                header("Accept-Language", ACCEPT_LANGUAGE),
                header(
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
                ),
                header("Accept-Encoding", "gzip, deflate, br"),
                header("Connection", "keep-alive"),
                header("Upgrade-Insecure-Requests", "1"),
                header("Sec-Fetch-Dest", "document"),
                header("Sec-Fetch-Mode", "navigate"),
                header("Sec-Fetch-Site", "none"),
                header("Cache-Control", "max-age=0"),
            ],
            hide_webdriver: true,
            chrome_runtime_stub: true,
            patch_permissions_query: true,
            plugins: default_plugins(),
            languages: vec!["en-US".into(), "en".into()],
            platform: "Win32".into(),
            hardware_concurrency: 8,
            device_memory_gb: 8,
            patch_iframe_webdriver: true,
            mouse_jitter: Some(MouseJitter {
                interval_ms: 100,
                amplitude_px: 5,
            }),
        }
    }
}

fn default_plugins() -> Vec<FakePlugin> {
    let mime = |mime: &str, suffixes: &str, description: &str| FakeMimeType {
        mime: mime.into(),
        suffixes: suffixes.into(),
        description: description.into(),
    };
    vec![
        FakePlugin {
            name: "Chrome PDF Plugin".into(),
            filename: "internal-pdf-viewer".into(),
            description: "Portable Document Format".into(),
            mime_types: vec![mime(
                "application/x-google-chrome-pdf",
                "pdf",
                "Portable Document Format",
            )],
        },
        FakePlugin {
            name: "Chrome PDF Viewer".into(),
            filename: "mhjfbmdgcfjbbpaeojofohoefgiehjai".into(),
            description: String::new(),
            mime_types: vec![mime("application/pdf", "pdf", "")],
        },
        FakePlugin {
            name: "Native Client".into(),
            filename: "internal-nacl-plugin".into(),
            description: String::new(),
            mime_types: vec![
                mime("application/x-nacl", "", "Native Client Executable"),
                mime("application/x-pnacl", "", "Portable Native Client Executable"),
            ],
        },
    ]
}

/// `Object.defineProperty(navigator, '<prop>', { get: () => <value> })`.
fn define_navigator_getter(out: &mut String, prop: &str, value_js: &str) {
    let _ = writeln!(
        out,
        "Object.defineProperty(navigator, '{prop}', {{ get: () => {value_js}, configurable: true }});"
    );
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

impl EvasionProfile {
    /// Render the profile as a self-contained init script.
    ///
    /// Each override is wrapped in its own `try` block so one failing patch
    /// (e.g. a property made non-configurable by the page) cannot stop the
    /// rest from applying.
    pub fn to_init_script(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if self.hide_webdriver {
            let mut s = String::new();
            define_navigator_getter(&mut s, "webdriver", "undefined");
            parts.push(s);
        }

        if self.chrome_runtime_stub {
            parts.push("window.chrome = window.chrome || {}; window.chrome.runtime = window.chrome.runtime || {};\n".into());
        }

        if self.patch_permissions_query {
            parts.push(
                r#"const __dclQuery = window.navigator.permissions.query;
const __dclPatched = (parameters) =>
  parameters && parameters.name === 'notifications'
    ? Promise.resolve({ state: Notification.permission })
    : __dclQuery.call(window.navigator.permissions, parameters);
window.navigator.permissions.query = __dclPatched;
const __dclToString = Function.prototype.toString;
Function.prototype.toString = function () {
  if (this === __dclPatched) { return 'function query() { [native code] }'; }
  return __dclToString.call(this);
};
"#
                .into(),
            );
        }

        if !self.plugins.is_empty() {
            let json = serde_json::to_string(&self.plugins).unwrap_or_else(|_| "[]".into());
            parts.push(format!(
                r#"const __dclPlugins = {json}.map((p) => {{
  const plugin = {{ name: p.name, filename: p.filename, description: p.description, length: p.mimeTypes.length }};
  p.mimeTypes.forEach((m, i) => {{ plugin[i] = Object.assign({{ enabledPlugin: plugin }}, m); }});
  return plugin;
}});
Object.defineProperty(navigator, 'plugins', {{ get: () => __dclPlugins, configurable: true }});
"#
            ));
        }

        if !self.languages.is_empty() {
            let json = serde_json::to_string(&self.languages).unwrap_or_else(|_| "[]".into());
            let mut s = String::new();
            define_navigator_getter(&mut s, "languages", &json);
            parts.push(s);
        }

        let mut hw = String::new();
        define_navigator_getter(&mut hw, "platform", &js_string(&self.platform));
        define_navigator_getter(
            &mut hw,
            "hardwareConcurrency",
            &self.hardware_concurrency.to_string(),
        );
        define_navigator_getter(&mut hw, "deviceMemory", &self.device_memory_gb.to_string());
        parts.push(hw);

        if self.patch_iframe_webdriver {
            parts.push(
                r#"const __dclContentWindow = Object.getOwnPropertyDescriptor(HTMLIFrameElement.prototype, 'contentWindow');
if (__dclContentWindow && __dclContentWindow.get) {
  Object.defineProperty(HTMLIFrameElement.prototype, 'contentWindow', {
    get: function () {
      const win = __dclContentWindow.get.call(this);
      if (win) { try { win.navigator.webdriver = false; } catch (e) {} }
      return win;
    },
  });
}
"#
                .into(),
            );
        }

        if let Some(j) = self.mouse_jitter {
            parts.push(format!(
                r#"let __dclX = 0, __dclY = 0;
setInterval(() => {{
  __dclX = Math.max(0, Math.min(window.innerWidth, __dclX + (Math.random() - 0.5) * {span}));
  __dclY = Math.max(0, Math.min(window.innerHeight, __dclY + (Math.random() - 0.5) * {span}));
}}, {interval});
"#,
                span = j.amplitude_px * 2,
                interval = j.interval_ms,
            ));
        }

        let mut script = String::from("(() => {\n");
        for part in parts {
            let _ = write!(script, "try {{\n{part}}} catch (e) {{}}\n");
        }
        script.push_str("})();\n");
        script
    }
}

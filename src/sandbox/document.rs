//! Assembles the three playground files into one self-contained document.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::ArtifactFields;

/// Prefix the guarded script block puts in front of a caught exception.
pub const SCRIPT_ERROR_PREFIX: &str = "JavaScript Error:";

static SCRIPT_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(script)").unwrap());

static STYLE_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(style)").unwrap());

/// Forwards `console.{log,error,warn,info}` and uncaught errors to the host as
/// `{type: 'console', level, message}`. Objects are pretty-printed JSON.
const CONSOLE_INTERCEPTOR: &str = r#"(function() {
  var host = window.opener || window.parent;
  var format = function(args) {
    return args.map(function(a) {
      if (typeof a === 'object' && a !== null) {
        try { return JSON.stringify(a, null, 2); } catch (e) { return String(a); }
      }
      return String(a);
    }).join(' ');
  };
  ['log', 'error', 'warn', 'info'].forEach(function(level) {
    var original = console[level];
    console[level] = function() {
      var args = Array.prototype.slice.call(arguments);
      host.postMessage({ type: 'console', level: level, message: format(args) }, '*');
      original.apply(console, args);
    };
  });
  window.onerror = function(message, source, lineno) {
    host.postMessage({ type: 'console', level: 'error', message: String(message) + ' (Line ' + lineno + ')' }, '*');
    return false;
  };
})();"#;

const ERROR_BANNER_STYLE: &str =
    "color: red; padding: 10px; border: 1px solid red; margin: 10px; background: #ffeeee;";

/// Keeps user text from closing the surrounding `<script>` element early.
pub fn guard_script(script: &str) -> String {
    SCRIPT_CLOSE.replace_all(script, r"<\/$1").into_owned()
}

fn guard_style(style: &str) -> String {
    STYLE_CLOSE.replace_all(style, r"<\/$1").into_owned()
}

/// Builds the full document for one run. The same sources always produce the
/// same bytes.
pub fn build(fields: &ArtifactFields) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
{style}
</style>
<script>
{interceptor}
</script>
</head>
<body>
{markup}
<script>
try {{
{script}
}} catch (error) {{
  console.error('{prefix}', error.message);
  var banner = document.createElement('div');
  banner.setAttribute('data-sandbox-error', '');
  banner.style.cssText = '{banner_style}';
  banner.textContent = 'Error: ' + error.message;
  document.body.appendChild(banner);
}}
</script>
</body>
</html>
"#,
        style = guard_style(&fields.style),
        interceptor = CONSOLE_INTERCEPTOR,
        markup = fields.markup,
        script = guard_script(&fields.script),
        prefix = SCRIPT_ERROR_PREFIX,
        banner_style = ERROR_BANNER_STYLE,
    )
}

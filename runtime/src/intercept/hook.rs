//! Page-context scripts.
//!
//! The hook wraps `fetch` and `XMLHttpRequest`, copies matching response
//! bodies into `window.__marketsweepHook.queue`, and never throws into the
//! host application. The runtime pulls the queue with [`DRAIN_SCRIPT`].

use serde_json::json;

use crate::config::InterceptSettings;

const HOOK_TEMPLATE: &str = r#"(function () {
  var cfg = __MARKETSWEEP_CONFIG__;
  var w = window;
  if (w.__marketsweepHook) {
    return false;
  }
  var hook = { queue: [], errors: 0, dropped: 0 };
  Object.defineProperty(w, '__marketsweepHook', { value: hook, enumerable: false });

  function contains(haystack, needles) {
    for (var i = 0; i < needles.length; i++) {
      if (haystack.indexOf(needles[i]) !== -1) return true;
    }
    return false;
  }
  function matches(url) {
    try { return contains(String(url), cfg.patterns); } catch (e) { hook.errors++; return false; }
  }
  function isDetail(url) {
    try {
      var here = String((w.location && w.location.href) || '');
      return contains(String(url), cfg.detailMarkers) || contains(here, cfg.detailMarkers);
    } catch (e) { hook.errors++; return false; }
  }
  function push(url, body) {
    try {
      if (typeof body !== 'string' || body.length === 0) return;
      if (hook.queue.length >= cfg.maxQueue) { hook.queue.shift(); hook.dropped++; }
      hook.queue.push({ url: String(url), detail: isDetail(url), body: body });
    } catch (e) { hook.errors++; }
  }

  var origFetch = w.fetch;
  if (typeof origFetch === 'function') {
    w.fetch = function (input) {
      var p = origFetch.apply(this, arguments);
      try {
        var url = typeof input === 'string' ? input : ((input && input.url) || '');
        if (matches(url)) {
          p.then(function (resp) {
            try {
              resp.clone().text().then(function (t) { push(url, t); }, function () { hook.errors++; });
            } catch (e) { hook.errors++; }
          }, function () {});
        }
      } catch (e) { hook.errors++; }
      return p;
    };
  }

  var XHR = w.XMLHttpRequest;
  if (XHR && XHR.prototype) {
    var origOpen = XHR.prototype.open;
    var origSend = XHR.prototype.send;
    XHR.prototype.open = function (method, url) {
      try { this.__marketsweepUrl = String(url); } catch (e) { hook.errors++; }
      return origOpen.apply(this, arguments);
    };
    XHR.prototype.send = function () {
      try {
        var xhr = this;
        var url = xhr.__marketsweepUrl;
        if (url && matches(url)) {
          xhr.addEventListener('load', function () {
            try {
              if (xhr.responseType === '' || xhr.responseType === 'text') push(url, xhr.responseText);
            } catch (e) { hook.errors++; }
          });
        }
      } catch (e) { hook.errors++; }
      return origSend.apply(this, arguments);
    };
  }
  return true;
})()"#;

/// Empties the page queue and reports hook counters.
pub const DRAIN_SCRIPT: &str = r#"(function () {
  var h = window.__marketsweepHook;
  if (!h) return { installed: false, items: [], errors: 0, dropped: 0 };
  var items = h.queue.splice(0, h.queue.length);
  return { installed: true, items: items, errors: h.errors, dropped: h.dropped };
})()"#;

pub const PROBE_SCRIPT: &str = "!!window.__marketsweepHook";

pub const SCROLL_SCRIPT: &str =
    "(function () { window.scrollTo(0, document.body ? document.body.scrollHeight : 0); return true; })()";

/// Nudge the feed: bounce the scroll position and click a "see more" control if present.
pub const TRIGGER_MORE_SCRIPT: &str = r#"(function () {
  window.scrollBy(0, -800);
  setTimeout(function () { window.scrollTo(0, document.body ? document.body.scrollHeight : 0); }, 300);
  var controls = document.querySelectorAll('[role="button"], button');
  for (var i = 0; i < controls.length; i++) {
    if (/see more|load more|show more/i.test(controls[i].textContent || '')) {
      controls[i].click();
      return true;
    }
  }
  return false;
})()"#;

/// Render the hook for the given settings.
pub fn hook_script(settings: &InterceptSettings) -> String {
    let config = json!({
        "patterns": settings.endpoint_patterns,
        "detailMarkers": settings.detail_markers,
        "maxQueue": settings.max_queue,
    });
    HOOK_TEMPLATE.replace("__MARKETSWEEP_CONFIG__", &config.to_string())
}

/// In-page `fetch` of a detail view, returning its text.
pub fn fetch_text_script(url: &str) -> String {
    let url = serde_json::Value::String(url.to_string());
    format!("fetch({url}, {{ credentials: 'include' }}).then(function (r) {{ return r.text(); }})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_script_embeds_settings() {
        let script = hook_script(&InterceptSettings::default());
        assert!(!script.contains("__MARKETSWEEP_CONFIG__"));
        assert!(script.contains(r#""patterns":["/api/graphql","/graphql"]"#));
        assert!(script.contains(r#""maxQueue":500"#));
        assert!(script.contains("if (w.__marketsweepHook)"));
    }

    #[test]
    fn test_fetch_script_escapes_url() {
        let script = fetch_text_script("https://example.com/item/1'\"/");
        assert!(script.starts_with(r#"fetch("https://example.com/item/1'\"/""#));
    }
}

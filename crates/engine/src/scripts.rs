//! DOM scripts evaluated through [`crate::page::Page`]
//!
//! Every script is a function expression. Page-level scripts take one JSON
//! argument; element scripts receive the element.

/// Visibility and actionability probe for one element.
///
/// Returns an [`crate::interaction::ElementProbe`].
pub const PROBE_ELEMENT: &str = r#"(el) => {
  const rect = el.getBoundingClientRect();
  const style = window.getComputedStyle(el);
  const visible = rect.width > 0 && rect.height > 0 && !el.hidden
    && style.display !== 'none' && style.visibility !== 'hidden';
  const parent = el.parentElement;
  const disabledAncestor = parent !== null
    && parent.closest('fieldset[disabled], [aria-disabled="true"]') !== null;
  const actionable = !el.disabled && !el.readOnly
    && el.getAttribute('aria-disabled') !== 'true'
    && style.pointerEvents !== 'none' && !disabledAncestor;
  const text = (el.innerText || el.value || el.getAttribute('aria-label') || '').trim();
  return {
    visible,
    actionable,
    tag: el.tagName.toLowerCase(),
    input_type: (el.getAttribute('type') || '').toLowerCase(),
    name: el.getAttribute('name') || '',
    id: el.id || '',
    text: text.slice(0, 60),
    href: el.getAttribute('href') || '',
    in_form: el.closest('form') !== null,
  };
}"#;

/// First selectable option value of a `<select>`, or null
pub const FIRST_OPTION_VALUE: &str = r#"(el) => {
  const options = Array.from(el.options || []);
  const choice = options.find(o => !o.disabled && o.value !== '' && !o.selected)
    || options.find(o => !o.disabled && o.value !== '');
  return choice ? choice.value : null;
}"#;

/// Every anchor on the page with whether it sits in a navigational container
pub const EXTRACT_LINKS: &str = r#"() => Array.from(document.querySelectorAll('a[href]')).map(a => ({
  href: a.href,
  in_nav: a.closest('nav, header, [role="navigation"], [role="menu"], [role="menubar"], .menu, .nav, .navbar, #menu, #nav') !== null,
}))"#;

/// Whether a recognizable overlay is currently visible
pub const OVERLAY_VISIBLE: &str = r#"(selectors) => selectors.some(sel => Array.from(document.querySelectorAll(sel)).some(el => {
  const rect = el.getBoundingClientRect();
  const style = window.getComputedStyle(el);
  return rect.width > 0 && rect.height > 0 && style.display !== 'none' && style.visibility !== 'hidden';
}))"#;

/// Scroll to the bottom of the document and back
pub const SCROLL_PAGE: &str = r#"() => {
  const height = document.body ? document.body.scrollHeight : 0;
  window.scrollTo(0, height);
  window.scrollTo(0, 0);
  return height;
}"#;

/// True when the document is wider than the viewport
pub const HORIZONTAL_OVERFLOW: &str = r#"() => document.documentElement.scrollWidth > window.innerWidth + 1"#;

pub const PAGE_HTML: &str = r#"() => document.documentElement ? document.documentElement.outerHTML : ''"#;

pub const CURRENT_URL: &str = r#"() => window.location.href"#;

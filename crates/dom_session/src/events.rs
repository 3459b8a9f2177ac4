//! Event trigger scripts. Selectors and values are passed as arguments.

/// Simulate a click on the first node matching `sel`.
///
/// Tries, in order: attached click listeners, attached click handlers, and
/// for submit/button controls the enclosing form's `onsubmit` followed by
/// `submit()` unless the handler prevented it. Returns whether anything ran.
pub(crate) const CLICK_FUNCTION: &str = r"function (sel) {
  var el = document.querySelector(sel);
  var fn;

  console.log('query ' + sel);

  if (!el) {
    console.log('el is null/undefined');
    return null;
  } else if (el._listeners && el._listeners.click && (fn = el.click.bind(el))) {
    fn();
    return true;
  } else if (el._handlers && el._handlers.click && (fn = el.click.bind(el))) {
    fn();
    return true;
  } else if (el.type === 'submit' || el.type === 'button') {
    var p = el.parentElement;
    for (; p != null; p = p.parentElement) {
      if (p.tagName && p.tagName === 'FORM') {
        var event = new Event('submit');
        event.cancelable = true;
        if (p.onsubmit) {
          p.onsubmit(event);
        }
        if (!event.defaultPrevented) {
          p.submit();
        }
        return true;
      }
    }
    return false;
  }
  console.log('   no handler found');
  return false;
}";

/// Set `attr` to `val` on the first node matching `sel`; returns whether one was found.
pub(crate) const PUT_ATTR_FUNCTION: &str = r"function (sel, attr, val) {
  var el = document.querySelector(sel);
  if (el) {
    el.setAttribute(attr, val);
  }
  return !!el;
}";

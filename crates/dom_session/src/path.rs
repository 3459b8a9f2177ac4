//! Path resolver: maps `/0/<segment>...` addresses onto document expressions.
//!
//! `/0` denotes the first `<body>` element. Numeric segments select element
//! children by index, anything else must be a plain identifier naming a
//! property. Identifiers are checked so a path can never smuggle script text
//! into the generated expression.

use crate::error::SessionError;

/// Expression for the node `/0` denotes.
pub const BODY_EXPRESSION: &str = "document.getElementsByTagName('body')[0]";

const ROOT_MARKER: &str = "/0";

/// One step below the body element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Child(usize),
    Property(String),
}

impl Segment {
    fn parse(raw: &str, path: &str) -> Result<Self, SessionError> {
        if raw.bytes().all(|byte| byte.is_ascii_digit()) {
            return raw
                .parse()
                .map(Segment::Child)
                .map_err(|_| SessionError::Path(path.to_owned()));
        }
        if is_identifier(raw) {
            Ok(Segment::Property(raw.to_owned()))
        } else {
            Err(SessionError::Path(path.to_owned()))
        }
    }

    fn accessor(&self) -> String {
        match self {
            Self::Child(index) => format!(".children[{index}]"),
            Self::Property(name) => format!(".{name}"),
        }
    }
}

fn is_identifier(raw: &str) -> bool {
    let mut chars = raw.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|rest| rest.is_ascii_alphanumeric() || rest == '_' || rest == '$')
}

/// A parsed document address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocPath {
    segments: Vec<Segment>,
}

impl DocPath {
    /// Parse an address that must start with the `/0` root marker.
    ///
    /// Empty segments are ignored.
    ///
    /// # Errors
    /// [`SessionError::Path`] when the marker is missing or a segment is
    /// neither an index nor an identifier.
    pub fn parse(path: &str) -> Result<Self, SessionError> {
        let rest = path
            .strip_prefix(ROOT_MARKER)
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .ok_or_else(|| SessionError::Path(path.to_owned()))?;
        let segments = rest
            .split('/')
            .filter(|raw| !raw.is_empty())
            .map(|raw| Segment::parse(raw, path))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Navigation expression starting from the body element.
    pub fn expression(&self) -> String {
        self.segments
            .iter()
            .fold(String::from(BODY_EXPRESSION), |mut expr, segment| {
                expr.push_str(&segment.accessor());
                expr
            })
    }
}

/// Split the trailing segment off `path` as the leaf key.
///
/// # Errors
/// [`SessionError::Path`] for a malformed prefix or key.
pub fn split_leaf(path: &str) -> Result<(DocPath, Segment), SessionError> {
    let (prefix, key) = path
        .rsplit_once('/')
        .ok_or_else(|| SessionError::Path(path.to_owned()))?;
    let parent = DocPath::parse(prefix)?;
    if key.is_empty() {
        return Err(SessionError::Path(path.to_owned()));
    }
    Ok((parent, Segment::parse(key, path)?))
}

/// Expression reading the addressed property.
///
/// # Errors
/// See [`split_leaf`].
pub fn read_expression(path: &str) -> Result<String, SessionError> {
    let (parent, leaf) = split_leaf(path)?;
    Ok(format!("{}{}", parent.expression(), leaf.accessor()))
}

/// Function expression assigning its single argument to the addressed property.
///
/// # Errors
/// See [`split_leaf`].
pub fn write_function(path: &str) -> Result<String, SessionError> {
    let target = read_expression(path)?;
    Ok(format!("function (value) {{ {target} = value; }}"))
}

/// Expression listing children indices, own data properties and own
/// methods (suffixed `()`) of the addressed node, one per line.
///
/// # Errors
/// See [`DocPath::parse`].
pub fn list_expression(path: &str) -> Result<String, SessionError> {
    let node = DocPath::parse(path)?.expression();
    Ok(format!(
        "(function () {{
  var node = {node};
  var items = [];
  var i;
  if (node == null) {{
    return '';
  }}
  if (node.children) {{
    for (i = 0; i < node.children.length; i++) {{
      items.push(i);
    }}
  }}
  var names = Object.getOwnPropertyNames(node);
  var methods = [];
  for (i = 0; i < names.length; i++) {{
    var desc = Object.getOwnPropertyDescriptor(node, names[i]);
    if (typeof desc.value === 'function') {{
      methods.push(names[i] + '()');
    }} else if (desc.enumerable) {{
      items.push(names[i]);
    }}
  }}
  return items.concat(methods).join('\\n');
}})()"
    ))
}

//! Request snippets for `getExample`.

use std::fmt::Write as _;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::error::AtlasError;
use crate::models::{method_has_body, AuthHint};

/// A snippet language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Curl,
    Python,
    JavaScript,
    TypeScript,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Curl,
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
    ];

    /// Parse a requested language; `all` expands to every language.
    pub fn parse_selection(raw: &str) -> Result<Vec<Language>, AtlasError> {
        if raw.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::ALL.to_vec());
        }
        raw.parse().map(|l| vec![l])
    }
}

impl FromStr for Language {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "curl" | "shell" | "bash" => Ok(Language::Curl),
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" => Ok(Language::JavaScript),
            "typescript" | "ts" => Ok(Language::TypeScript),
            other => Err(AtlasError::Validation(format!(
                "unsupported language '{}': expected curl, python, javascript, typescript, or all",
                other
            ))),
        }
    }
}

/// Everything a snippet template needs.
#[derive(Debug, Clone)]
pub struct RequestShape {
    pub method: String,
    pub url: String,
    pub auth: Option<AuthHint>,
    /// Example body; ignored unless the method carries one.
    pub body: Option<Value>,
}

/// A rendered snippet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snippet {
    pub language: Language,
    pub code: String,
}

/// Join a base URL and an endpoint path with exactly one `/`.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl RequestShape {
    fn method(&self) -> String {
        self.method.to_ascii_uppercase()
    }

    fn body(&self) -> Option<&Value> {
        if method_has_body(&self.method) {
            self.body.as_ref()
        } else {
            None
        }
    }

    /// Final URL, including an API-key query placeholder when required.
    fn url(&self) -> String {
        match &self.auth {
            Some(AuthHint::ApiKeyQuery { name }) => {
                let sep = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}{}=<API_KEY>", self.url, sep, name)
            }
            _ => self.url.clone(),
        }
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        if method_has_body(&self.method) {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        match &self.auth {
            Some(AuthHint::Bearer) => {
                headers.push(("Authorization".into(), "Bearer <TOKEN>".into()));
            }
            Some(AuthHint::OAuth2) => {
                headers.push(("Authorization".into(), "Bearer <ACCESS_TOKEN>".into()));
            }
            Some(AuthHint::Basic) => {
                headers.push(("Authorization".into(), "Basic <BASE64_CREDENTIALS>".into()));
            }
            Some(AuthHint::ApiKeyHeader { name }) => {
                headers.push((name.clone(), "<API_KEY>".into()));
            }
            Some(AuthHint::ApiKeyQuery { .. }) | None => {}
        }
        headers
    }
}

/// Render one snippet.
pub fn render(language: Language, request: &RequestShape) -> Snippet {
    let code = match language {
        Language::Curl => curl(request),
        Language::Python => python(request),
        Language::JavaScript => fetch(request, false),
        Language::TypeScript => fetch(request, true),
    };
    Snippet { language, code }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .enumerate()
        .map(|(i, l)| if i == 0 { l.to_string() } else { format!("{}{}", prefix, l) })
        .collect::<Vec<_>>()
        .join("\n")
}

fn curl(r: &RequestShape) -> String {
    let mut lines = vec![format!("curl -X {} {}", r.method(), shell_quote(&r.url()))];
    for (k, v) in r.headers() {
        lines.push(format!("  -H {}", shell_quote(&format!("{}: {}", k, v))));
    }
    if let Some(body) = r.body() {
        lines.push(format!("  -d {}", shell_quote(&pretty(body))));
    }
    lines.join(" \\\n")
}

/// Render a JSON value as a Python literal.
pub fn python_literal(value: &Value) -> String {
    let mut out = String::new();
    write_python(value, 0, &mut out);
    out
}

fn write_python(value: &Value, level: usize, out: &mut String) {
    let pad = "    ".repeat(level + 1);
    let close = "    ".repeat(level);
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&Value::String(s.clone()).to_string()),
        Value::Array(items) if items.is_empty() => out.push_str("[]"),
        Value::Array(items) => {
            out.push_str("[\n");
            for item in items {
                out.push_str(&pad);
                write_python(item, level + 1, out);
                out.push_str(",\n");
            }
            out.push_str(&close);
            out.push(']');
        }
        Value::Object(map) if map.is_empty() => out.push_str("{}"),
        Value::Object(map) => {
            out.push_str("{\n");
            for (k, v) in map {
                let _ = write!(out, "{}{}: ", pad, Value::String(k.clone()));
                write_python(v, level + 1, out);
                out.push_str(",\n");
            }
            out.push_str(&close);
            out.push('}');
        }
    }
}

fn python(r: &RequestShape) -> String {
    let mut code = String::from("import requests\n\n");
    let _ = writeln!(code, "url = {}", Value::String(r.url()));
    code.push_str("headers = {\n");
    for (k, v) in r.headers() {
        let _ = writeln!(code, "    {}: {},", Value::String(k), Value::String(v));
    }
    code.push_str("}\n");
    let method = r.method().to_ascii_lowercase();
    match r.body() {
        Some(body) => {
            let _ = writeln!(code, "payload = {}\n", python_literal(body));
            let _ = writeln!(
                code,
                "response = requests.{}(url, headers=headers, json=payload)",
                method
            );
        }
        None => {
            let _ = writeln!(code, "\nresponse = requests.{}(url, headers=headers)", method);
        }
    }
    code.push_str("response.raise_for_status()\nprint(response.json())\n");
    code
}

fn fetch(r: &RequestShape, typed: bool) -> String {
    let mut code = String::new();
    let response_decl = if typed { "const response: Response" } else { "const response" };
    let _ = writeln!(
        code,
        "{} = await fetch({}, {{",
        response_decl,
        Value::String(r.url())
    );
    let _ = writeln!(code, "  method: {},", Value::String(r.method()));
    code.push_str("  headers: {\n");
    for (k, v) in r.headers() {
        let _ = writeln!(code, "    {}: {},", Value::String(k), Value::String(v));
    }
    code.push_str("  },\n");
    if let Some(body) = r.body() {
        let _ = writeln!(code, "  body: JSON.stringify({}),", indent(&pretty(body), "  "));
    }
    code.push_str("});\n");
    if typed {
        code.push_str("const data: unknown = await response.json();\n");
    } else {
        code.push_str("const data = await response.json();\n");
    }
    code.push_str("console.log(data);\n");
    code
}

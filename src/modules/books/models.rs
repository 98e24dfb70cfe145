use libris_db::{Document, ID_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A persisted book record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Store-assigned identifier, immutable once created
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    pub stock: u64,
    /// Copies sold, only consulted by the bestseller ranking
    #[serde(default)]
    pub sold: u64,
}

impl Book {
    /// Decode a stored document, moving `_id` into `id`.
    pub fn from_document(mut doc: Document) -> Result<Self, String> {
        let id = match doc.remove(ID_FIELD) {
            Some(Value::String(id)) => id,
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(format!("document has no usable {}", ID_FIELD)),
        };
        doc.insert("id".to_string(), Value::String(id.clone()));
        serde_json::from_value(Value::Object(doc))
            .map_err(|err| format!("document '{}' is not a book: {}", id, err))
    }
}

/// Client-supplied book fields, used for both create and full-replacement
/// update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookInput {
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub sold: i64,
}

/// One rejected field and the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: &'static str,
    pub error: String,
}

impl FieldViolation {
    fn new(field: &'static str, error: impl Into<String>) -> Self {
        Self {
            field,
            error: error.into(),
        }
    }

    pub fn to_detail(&self) -> Value {
        json!({"field": self.field, "error": self.error})
    }
}

fn check_text(field: &'static str, value: &str, violations: &mut Vec<FieldViolation>) {
    if value.trim().is_empty() {
        violations.push(FieldViolation::new(field, "must not be empty"));
    }
}

fn check_price(price: f64, violations: &mut Vec<FieldViolation>) {
    if !price.is_finite() {
        violations.push(FieldViolation::new("price", "must be a finite number"));
    } else if price < 0.0 {
        violations.push(FieldViolation::new(
            "price",
            "must be greater than or equal to 0",
        ));
    }
}

fn check_count(field: &'static str, value: i64, violations: &mut Vec<FieldViolation>) {
    if value < 0 {
        violations.push(FieldViolation::new(
            field,
            "must be greater than or equal to 0",
        ));
    }
}

fn required_text(
    body: &serde_json::Map<String, Value>,
    field: &'static str,
    violations: &mut Vec<FieldViolation>,
) -> Option<String> {
    match body.get(field) {
        None | Some(Value::Null) => {
            violations.push(FieldViolation::new(field, "field required"));
            None
        }
        Some(Value::String(s)) => {
            check_text(field, s, violations);
            Some(s.clone())
        }
        Some(_) => {
            violations.push(FieldViolation::new(field, "must be a string"));
            None
        }
    }
}

fn integer(
    body: &serde_json::Map<String, Value>,
    field: &'static str,
    default: Option<i64>,
    violations: &mut Vec<FieldViolation>,
) -> Option<i64> {
    match body.get(field) {
        None | Some(Value::Null) => {
            if default.is_none() {
                violations.push(FieldViolation::new(field, "field required"));
            }
            default
        }
        Some(Value::Number(n)) => match n.as_i64() {
            Some(v) => {
                check_count(field, v, violations);
                Some(v)
            }
            None if n.is_u64() => {
                violations.push(FieldViolation::new(field, "is too large"));
                None
            }
            None => {
                violations.push(FieldViolation::new(field, "must be an integer"));
                None
            }
        },
        Some(_) => {
            violations.push(FieldViolation::new(field, "must be an integer"));
            None
        }
    }
}

impl BookInput {
    /// Check a raw request body field by field, reporting every violation.
    /// Unknown fields, including any client-supplied `id`, are ignored.
    pub fn from_json(body: &Value) -> Result<Self, Vec<FieldViolation>> {
        let Some(body) = body.as_object() else {
            return Err(vec![FieldViolation::new("body", "must be a JSON object")]);
        };

        let mut violations = Vec::new();

        let title = required_text(body, "title", &mut violations);
        let author = required_text(body, "author", &mut violations);

        let description = match body.get("description") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                violations.push(FieldViolation::new("description", "must be a string"));
                None
            }
        };

        let price = match body.get("price") {
            None | Some(Value::Null) => {
                violations.push(FieldViolation::new("price", "field required"));
                None
            }
            Some(Value::Number(n)) => n.as_f64().inspect(|p| check_price(*p, &mut violations)),
            Some(_) => {
                violations.push(FieldViolation::new("price", "must be a number"));
                None
            }
        };

        let stock = integer(body, "stock", None, &mut violations);
        let sold = integer(body, "sold", Some(0), &mut violations);

        match (title, author, price, stock, sold) {
            (Some(title), Some(author), Some(price), Some(stock), Some(sold))
                if violations.is_empty() =>
            {
                Ok(BookInput {
                    title,
                    author,
                    description,
                    price,
                    stock,
                    sold,
                })
            }
            _ => Err(violations),
        }
    }

    /// Range and emptiness checks for an already-typed input.
    pub fn validate(&self) -> Result<(), Vec<FieldViolation>> {
        let mut violations = Vec::new();
        check_text("title", &self.title, &mut violations);
        check_text("author", &self.author, &mut violations);
        check_price(self.price, &mut violations);
        check_count("stock", self.stock, &mut violations);
        check_count("sold", self.sold, &mut violations);

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Stored form of the record, without an identifier.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("title".into(), json!(self.title));
        doc.insert("author".into(), json!(self.author));
        doc.insert("description".into(), json!(self.description));
        doc.insert("price".into(), json!(self.price));
        doc.insert("stock".into(), json!(self.stock));
        doc.insert("sold".into(), json!(self.sold));
        doc
    }
}

/// Number of books written by one author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorCount {
    pub author: String,
    pub book_count: u64,
}

/// Query string accepted by the search endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchQuery {
    pub title: Option<String>,
    pub author: Option<String>,
    #[serde(alias = "minPrice")]
    pub min_price: Option<f64>,
    #[serde(alias = "maxPrice")]
    pub max_price: Option<f64>,
}

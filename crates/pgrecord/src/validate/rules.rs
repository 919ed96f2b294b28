//! Type-specific rule checks applied after coercion.

use super::errors::{FieldError, ValidationCode};
use crate::crypto::FieldCrypto;
use crate::schema::{
    Case, Constraints, FieldDescriptor, FloatRules, IntRules, StringRules, UintRules,
};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};

/// Returns whether `value` matches `pattern`, compiling each pattern once.
pub(crate) fn regex_is_match(pattern: &str, value: &str) -> Result<bool, regex::Error> {
    static CACHE: OnceLock<Mutex<HashMap<String, regex::Regex>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));

    let regex = {
        let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
        match cache.get(pattern) {
            Some(re) => re.clone(),
            None => {
                let re = regex::Regex::new(pattern)?;
                cache.insert(pattern.to_string(), re.clone());
                re
            }
        }
    };

    Ok(regex.is_match(value))
}

/// Apply the descriptor's constraint block to an already coerced value.
pub(crate) fn apply(
    field: &FieldDescriptor,
    value: Value,
    crypto: Option<&dyn FieldCrypto>,
) -> Result<Value, FieldError> {
    let name = field.name();
    match (field.constraints(), value) {
        (Constraints::String(rules), Value::Text(s)) => {
            string(name, rules, &s, crypto).map(Value::Text)
        }
        (Constraints::Float(rules), Value::Float(f)) => float(name, rules, f).map(Value::Float),
        (Constraints::Int(rules), Value::Int(i)) => int(name, rules, i).map(Value::Int),
        (Constraints::Uint(rules), Value::Uint(u)) => uint(name, rules, u).map(Value::Uint),
        (_, value) => Ok(value),
    }
}

fn string(
    name: &str,
    rules: &StringRules,
    raw: &str,
    crypto: Option<&dyn FieldCrypto>,
) -> Result<String, FieldError> {
    let value = raw.trim();

    if let Some(pattern) = &rules.pattern {
        let matched = regex_is_match(pattern, value)
            .map_err(|e| FieldError::new(name, ValidationCode::Regex, e.to_string()))?;
        if !matched {
            return Err(FieldError::new(
                name,
                ValidationCode::Regex,
                "does not match the required pattern",
            ));
        }
    }

    if rules.hash || rules.encrypt {
        let Some(crypto) = crypto else {
            return Err(FieldError::new(
                name,
                ValidationCode::Crypto,
                "no crypto capability is configured for this schema",
            ));
        };
        let out = if rules.hash {
            crypto.hash(value)
        } else {
            crypto.encrypt(value)
        };
        return out.map_err(|e| FieldError::new(name, ValidationCode::Crypto, e.to_string()));
    }

    let len = value.chars().count();
    if let Some(min) = rules.min_len {
        if len < min {
            return Err(FieldError::new(
                name,
                ValidationCode::Len,
                format!("must be at least {min} characters"),
            ));
        }
    }
    if let Some(max) = rules.max_len {
        if len > max {
            return Err(FieldError::new(
                name,
                ValidationCode::Len,
                format!("must be at most {max} characters"),
            ));
        }
    }

    Ok(match rules.case() {
        Some(Case::Upper) => value.to_uppercase(),
        Some(Case::Lower) => value.to_lowercase(),
        None => value.to_string(),
    })
}

// Collects every violation of one numeric field into a single error.
struct Violations<'a> {
    name: &'a str,
    code: Option<ValidationCode>,
    messages: Vec<String>,
}

impl<'a> Violations<'a> {
    fn new(name: &'a str) -> Self {
        Self {
            name,
            code: None,
            messages: Vec::new(),
        }
    }

    fn add(&mut self, code: ValidationCode, message: String) {
        self.code.get_or_insert(code);
        self.messages.push(message);
    }

    fn finish<T>(self, value: T) -> Result<T, FieldError> {
        match self.code {
            None => Ok(value),
            Some(code) => Err(FieldError::new(self.name, code, self.messages.join("; "))),
        }
    }
}

fn float(name: &str, rules: &FloatRules, value: f64) -> Result<f64, FieldError> {
    let mut v = Violations::new(name);
    if let Some(lower) = rules.lower_bound {
        if value <= lower {
            v.add(ValidationCode::Range, format!("must be greater than {lower}"));
        }
    }
    if let Some(upper) = rules.upper_bound {
        if value >= upper {
            v.add(ValidationCode::Range, format!("must be less than {upper}"));
        }
    }
    if !rules.allow_negative && value < 0.0 {
        v.add(ValidationCode::Negative, "must not be negative".to_string());
    }
    let stored = if rules.percentage { value / 100.0 } else { value };
    v.finish(stored)
}

fn int(name: &str, rules: &IntRules, value: i64) -> Result<i64, FieldError> {
    let mut v = Violations::new(name);
    if !rules.allow_negative && value < 0 {
        v.add(ValidationCode::Negative, "must not be negative".to_string());
    }
    if let Some(min) = rules.min {
        if value < min {
            v.add(ValidationCode::Range, format!("must be at least {min}"));
        }
    }
    if let Some(max) = rules.max {
        if value > max {
            v.add(ValidationCode::Range, format!("must not exceed {max}"));
        }
    }
    v.finish(value)
}

fn uint(name: &str, rules: &UintRules, value: u64) -> Result<u64, FieldError> {
    match rules.max {
        Some(max) if value > max => Err(FieldError::new(
            name,
            ValidationCode::Range,
            format!("must not exceed {max}"),
        )),
        _ => Ok(value),
    }
}

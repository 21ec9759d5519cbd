//! Browser-side persistence seams: local storage and cookies.

use std::cell::RefCell;
use std::collections::HashMap;

/// Key/value storage scoped to the site (the browser's local storage).
pub trait ClientStorage {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: String);
}

/// Cookies visible to the page script.
pub trait CookieJar {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str, max_age_days: i64);
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RefCell<HashMap<String, String>>,
}

impl ClientStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.borrow().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: String) {
        self.items.borrow_mut().insert(key.to_string(), value);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    pub value: String,
    pub max_age_days: i64,
}

#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: RefCell<HashMap<String, StoredCookie>>,
}

impl MemoryCookieJar {
    pub fn remove(&self, name: &str) {
        self.cookies.borrow_mut().remove(name);
    }

    pub fn cookie(&self, name: &str) -> Option<StoredCookie> {
        self.cookies.borrow().get(name).cloned()
    }
}

impl CookieJar for MemoryCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        self.cookies
            .borrow()
            .get(name)
            .map(|c| c.value.clone())
            .filter(|v| !v.is_empty())
    }

    fn set(&self, name: &str, value: &str, max_age_days: i64) {
        self.cookies.borrow_mut().insert(
            name.to_string(),
            StoredCookie {
                value: value.to_string(),
                max_age_days,
            },
        );
    }
}

impl<T: ClientStorage + ?Sized> ClientStorage for std::rc::Rc<T> {
    fn get_item(&self, key: &str) -> Option<String> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: String) {
        (**self).set_item(key, value)
    }
}

impl<T: CookieJar + ?Sized> CookieJar for std::rc::Rc<T> {
    fn get(&self, name: &str) -> Option<String> {
        (**self).get(name)
    }

    fn set(&self, name: &str, value: &str, max_age_days: i64) {
        (**self).set(name, value, max_age_days)
    }
}

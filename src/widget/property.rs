use crate::adaptor::PropertyDef;
use crate::observer::{HandlerId, Observers};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Translation metadata carried by string properties.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct I18n {
    pub translatable: bool,
    pub context: Option<String>,
    pub comment: Option<String>,
}

/// One property's value on one widget.
#[derive(Debug)]
pub struct Property {
    def: Arc<PropertyDef>,
    value: Value,
    enabled: bool,
    sensitive: bool,
    insensitive_reason: Option<String>,
    i18n: I18n,
    save_always: bool,
    /// Set while a value is being pushed to the toolkit.
    pub(crate) loading: bool,
    observers: Observers<Value>,
}

impl Property {
    pub fn new(def: Arc<PropertyDef>) -> Self {
        Self {
            value: def.default.clone(),
            enabled: !def.optional || def.optional_default,
            sensitive: true,
            insensitive_reason: None,
            i18n: I18n {
                translatable: def.translatable,
                ..Default::default()
            },
            save_always: def.save_always,
            loading: false,
            observers: Observers::default(),
            def,
        }
    }

    pub fn def(&self) -> &Arc<PropertyDef> {
        &self.def
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Stores `value`, returning whether it changed.
    pub(crate) fn assign(&mut self, value: Value) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        true
    }

    /// Disabled optional properties never reach the toolkit.
    pub fn enabled(&self) -> bool {
        !self.def.optional || self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn sensitive(&self) -> bool {
        self.sensitive
    }

    pub fn insensitive_reason(&self) -> Option<&str> {
        self.insensitive_reason.as_deref()
    }

    pub(crate) fn set_sensitive(&mut self, sensitive: bool, reason: Option<String>) {
        self.sensitive = sensitive;
        self.insensitive_reason = if sensitive { None } else { reason };
    }

    pub fn i18n(&self) -> &I18n {
        &self.i18n
    }

    pub(crate) fn set_i18n(&mut self, i18n: I18n) {
        self.i18n = i18n;
    }

    pub fn save_always(&self) -> bool {
        self.save_always
    }

    pub(crate) fn set_save_always(&mut self, save_always: bool) {
        self.save_always = save_always;
    }

    pub fn is_default(&self) -> bool {
        self.def.is_default(&self.value)
    }

    /// Whether the property is written out when its widget is saved.
    pub fn should_save(&self) -> bool {
        self.def.save
            && !self.def.ignore
            && self.enabled()
            && (self.save_always
                || self.def.save_always
                || (self.def.optional && self.enabled)
                || !self.is_default())
    }

    pub(crate) fn connect(&mut self, handler: impl FnMut(&Value) + 'static) -> HandlerId {
        self.observers.connect(handler)
    }

    pub(crate) fn disconnect(&mut self, id: HandlerId) -> bool {
        self.observers.disconnect(id)
    }

    /// Hands the current value to every observer.
    pub(crate) fn notify(&mut self) {
        self.observers.emit(&self.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::ParamSpec;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn def(optional: bool) -> Arc<PropertyDef> {
        let mut def =
            PropertyDef::from_param_spec(&ParamSpec::int("max-length", "Max", 0, 100, 0), "Entry", false);
        def.optional = optional;
        Arc::new(def)
    }

    #[test]
    fn test_assign_does_not_notify() {
        let mut prop = Property::new(def(false));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let handler = prop.connect(move |v| s.borrow_mut().push(v.clone()));
        assert!(prop.assign(Value::Int(4)));
        assert!(!prop.assign(Value::Int(4)));
        assert!(seen.borrow().is_empty());

        prop.notify();
        assert_eq!(*seen.borrow(), vec![Value::Int(4)]);
        assert!(prop.disconnect(handler));
        prop.notify();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_optional_starts_disabled() {
        let prop = Property::new(def(true));
        assert!(!prop.enabled());
        assert!(!prop.should_save());
        assert!(Property::new(def(false)).enabled());
    }

    #[test]
    fn test_save_gating() {
        let mut prop = Property::new(def(false));
        assert!(!prop.should_save());
        prop.set_save_always(true);
        assert!(prop.should_save());
        prop.set_save_always(false);
        prop.assign(Value::Int(9));
        assert!(prop.should_save());
    }

    #[test]
    fn test_enabled_optional_saved_at_default() {
        let mut prop = Property::new(def(true));
        prop.set_enabled(true);
        assert!(prop.is_default());
        assert!(prop.should_save());
        prop.set_enabled(false);
        assert!(!prop.should_save());
    }

    #[test]
    fn test_insensitive_reason_cleared() {
        let mut prop = Property::new(def(false));
        prop.set_sensitive(false, Some("locked".into()));
        assert_eq!(prop.insensitive_reason(), Some("locked"));
        prop.set_sensitive(true, Some("ignored".into()));
        assert_eq!(prop.insensitive_reason(), None);
    }
}

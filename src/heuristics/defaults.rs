//! Stock shapes for the last fallback tier. Never fails.
use crate::ir::{Format, Properties, SchemaNode};

#[derive(Debug, Clone)]
pub struct DefaultShapes {
    /// Method-name prefixes answering with a list of records.
    pub list_prefixes: Vec<&'static str>,
    /// Method-name prefixes answering with a single record.
    pub record_prefixes: Vec<&'static str>,
    /// Method-name prefixes answering with a confirmation message.
    pub delete_prefixes: Vec<&'static str>,
    /// Class-name suffixes that denote a list of records.
    pub collection_suffixes: Vec<&'static str>,
}

impl DefaultShapes {
    pub fn standard() -> Self {
        Self {
            list_prefixes: vec!["index", "list", "all", "search", "browse"],
            record_prefixes: vec!["show", "get", "find", "store", "create", "update", "edit", "view"],
            delete_prefixes: vec!["destroy", "delete", "remove"],
            collection_suffixes: vec!["collection"],
        }
    }

    /// `{id, created_at, updated_at}`
    pub fn record() -> SchemaNode {
        let mut props = Properties::new();
        props.insert("id".into(), SchemaNode::integer().with_required(true));
        props.insert("created_at".into(), SchemaNode::string().with_format(Format::DateTime));
        props.insert("updated_at".into(), SchemaNode::string().with_format(Format::DateTime));
        SchemaNode::object(props)
    }

    fn message() -> SchemaNode {
        let mut props = Properties::new();
        props.insert("message".into(), SchemaNode::string().with_required(true));
        SchemaNode::object(props)
    }

    fn has_prefix(prefixes: &[&str], name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        prefixes.iter().any(|p| name.starts_with(p))
    }

    pub fn is_list_method(&self, method: &str) -> bool {
        Self::has_prefix(&self.list_prefixes, method)
    }

    /// Output of a method we learned nothing about.
    pub fn method_output(&self, method: &str) -> SchemaNode {
        if Self::has_prefix(&self.delete_prefixes, method) {
            Self::message()
        } else if self.is_list_method(method) {
            SchemaNode::array(Self::record())
        } else {
            Self::record()
        }
    }

    /// Output of a class we learned nothing about.
    pub fn class_output(&self, short_name: &str) -> SchemaNode {
        let lower = short_name.to_ascii_lowercase();
        if self.collection_suffixes.iter().any(|s| lower.ends_with(s)) {
            SchemaNode::array(Self::record())
        } else {
            Self::record()
        }
    }

    /// Input of a method with no rules and no declared input type.
    pub fn method_input(&self, method: &str) -> SchemaNode {
        if self.is_list_method(method) {
            let mut props = Properties::new();
            props.insert("page".into(), SchemaNode::integer().with_example(1.into()));
            props.insert("per_page".into(), SchemaNode::integer().with_example(15.into()));
            SchemaNode::object(props)
        } else {
            SchemaNode::empty_object()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Kind;

    #[test]
    fn method_names_pick_stock_shapes() {
        let d = DefaultShapes::standard();
        assert_eq!(d.method_output("index").kind(), Kind::Array);
        assert_eq!(d.method_output("showProfile").kind(), Kind::Object);
        assert!(d.method_output("destroy").property("message").is_some());
        assert!(d.method_output("doSomething").property("id").is_some());
    }

    #[test]
    fn collection_classes_default_to_arrays() {
        let d = DefaultShapes::standard();
        assert_eq!(d.class_output("UserCollection").kind(), Kind::Array);
        assert_eq!(d.class_output("UserResource").kind(), Kind::Object);
        assert!(d.method_input("index").property("per_page").is_some());
        assert_eq!(d.method_input("store").properties().map(|p| p.len()), Some(0));
    }
}

// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use minidom::{Element, NSChoice};

use crate::util::ParseError;

pub trait ElementExt {
    fn expect_is<'a>(
        &self,
        name: impl AsRef<str>,
        ns: impl Into<NSChoice<'a>>,
    ) -> Result<(), ParseError>;

    fn attr_req(&self, name: impl AsRef<str>) -> Result<&str, ParseError>;
}

impl ElementExt for Element {
    fn expect_is<'a>(
        &self,
        name: impl AsRef<str>,
        ns: impl Into<NSChoice<'a>>,
    ) -> Result<(), ParseError> {
        let ns = ns.into();
        if !self.is(&name, ns) {
            return Err(ParseError::UnexpectedElement {
                expected: format!("{}@{}", name.as_ref(), ns_choice_to_string(ns)),
                got: format!("{}@{}", self.name(), self.ns()),
            });
        }
        Ok(())
    }

    fn attr_req(&self, name: impl AsRef<str>) -> Result<&str, ParseError> {
        self.attr(name.as_ref())
            .ok_or_else(|| ParseError::MissingAttribute {
                attribute: name.as_ref().to_string(),
                element: self.name().to_string(),
            })
    }
}

pub fn parse_bool(value: &str) -> Result<bool, ParseError> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(ParseError::Generic {
            msg: format!("Invalid boolean value '{value}'"),
        }),
    }
}

fn ns_choice_to_string<'a>(ns: impl Into<NSChoice<'a>>) -> String {
    match ns.into() {
        NSChoice::None => "<none>".to_string(),
        NSChoice::OneOf(ns) => ns.to_string(),
        NSChoice::AnyOf(ns_list) => ns_list.join(" or "),
        NSChoice::Any => "<any>".to_string(),
    }
}

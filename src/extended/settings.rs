//! Versioned XML persistence for the extended property catalog.
//!
//! The document is self-describing: each property's `Type` attribute is a
//! serialized data-type id resolved back through the closed factory in
//! `ExtendedDataType::from_id`. Documents older than the current schema
//! version deserialize to an empty settings object, newer ones are
//! rejected.

use crate::core::{Result, StoreError};
use crate::extended::{ExtendedDataType, ExtendedPropertyDef};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

pub const SETTINGS_SCHEMA_VERSION: u32 = 3;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionSettings {
    pub provider_type: String,
    pub lookups: Vec<String>,
    pub properties: Vec<ExtendedPropertyDef>,
}

fn xml_err(err: impl std::fmt::Display) -> StoreError {
    StoreError::Settings(err.to_string())
}

impl ExtensionSettings {
    pub fn new(provider_type: impl Into<String>) -> Self {
        Self {
            provider_type: provider_type.into(),
            lookups: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        let mut root = BytesStart::new("ExtensionSettings");
        root.push_attribute(("providerType", self.provider_type.as_str()));
        root.push_attribute(("schemaVersion", SETTINGS_SCHEMA_VERSION.to_string().as_str()));
        writer.write_event(Event::Start(root)).map_err(xml_err)?;

        writer
            .write_event(Event::Start(BytesStart::new("Lookups")))
            .map_err(xml_err)?;
        for lookup in &self.lookups {
            let mut el = BytesStart::new("Lookup");
            el.push_attribute(("Name", lookup.as_str()));
            writer.write_event(Event::Empty(el)).map_err(xml_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("Lookups")))
            .map_err(xml_err)?;

        writer
            .write_event(Event::Start(BytesStart::new("ExtendedProperties")))
            .map_err(xml_err)?;
        for prop in &self.properties {
            let mut el = BytesStart::new("ExtendedProperty");
            el.push_attribute(("Name", prop.name.as_str()));
            el.push_attribute(("NativeName", prop.native_name.as_str()));
            el.push_attribute(("Type", prop.data_type.id().as_str()));
            el.push_attribute(("EntityTypeId", prop.entity_type_id.to_string().as_str()));

            let has_settings = prop.size.is_some() || prop.multi_value;
            if has_settings {
                writer.write_event(Event::Start(el)).map_err(xml_err)?;
                let mut settings = BytesStart::new("Settings");
                if let Some(size) = prop.size {
                    settings.push_attribute(("Size", size.to_string().as_str()));
                }
                if prop.multi_value {
                    settings.push_attribute(("MultiValue", "true"));
                }
                writer.write_event(Event::Empty(settings)).map_err(xml_err)?;
                writer
                    .write_event(Event::End(BytesEnd::new("ExtendedProperty")))
                    .map_err(xml_err)?;
            } else {
                writer.write_event(Event::Empty(el)).map_err(xml_err)?;
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new("ExtendedProperties")))
            .map_err(xml_err)?;

        writer
            .write_event(Event::End(BytesEnd::new("ExtensionSettings")))
            .map_err(xml_err)?;

        String::from_utf8(writer.into_inner()).map_err(xml_err)
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut settings = Self::default();
        let mut current_property: Option<ExtendedPropertyDef> = None;

        loop {
            let event = reader.read_event().map_err(xml_err)?;
            match event {
                Event::Start(ref el) | Event::Empty(ref el) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    match el.name().as_ref() {
                        b"ExtensionSettings" => {
                            let mut version = 0u32;
                            for attr in el.attributes() {
                                let attr = attr.map_err(xml_err)?;
                                let value = attr.unescape_value().map_err(xml_err)?;
                                match attr.key.as_ref() {
                                    b"providerType" => {
                                        settings.provider_type = value.into_owned();
                                    }
                                    b"schemaVersion" => {
                                        version = value.parse().map_err(xml_err)?;
                                    }
                                    _ => {}
                                }
                            }
                            if version > SETTINGS_SCHEMA_VERSION {
                                return Err(StoreError::UnsupportedSchemaVersion(version));
                            }
                            if version < SETTINGS_SCHEMA_VERSION {
                                // Pre-v3 documents carry nothing we can use.
                                return Ok(Self::default());
                            }
                        }
                        b"Lookup" => {
                            for attr in el.attributes() {
                                let attr = attr.map_err(xml_err)?;
                                if attr.key.as_ref() == b"Name" {
                                    let value = attr.unescape_value().map_err(xml_err)?;
                                    settings.lookups.push(value.into_owned());
                                }
                            }
                        }
                        b"ExtendedProperty" => {
                            let prop = Self::read_property(el)?;
                            if is_empty {
                                settings.properties.push(prop);
                            } else {
                                current_property = Some(prop);
                            }
                        }
                        b"Settings" => {
                            let prop = current_property.as_mut().ok_or_else(|| {
                                StoreError::Settings(
                                    "Settings element outside ExtendedProperty".to_string(),
                                )
                            })?;
                            for attr in el.attributes() {
                                let attr = attr.map_err(xml_err)?;
                                let value = attr.unescape_value().map_err(xml_err)?;
                                match attr.key.as_ref() {
                                    b"Size" => {
                                        prop.size = Some(value.parse().map_err(xml_err)?);
                                    }
                                    b"MultiValue" => {
                                        prop.multi_value = value.as_ref() == "true";
                                    }
                                    _ => {}
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Event::End(ref el) => {
                    if el.name().as_ref() == b"ExtendedProperty"
                        && let Some(prop) = current_property.take()
                    {
                        settings.properties.push(prop);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(settings)
    }

    fn read_property(el: &BytesStart<'_>) -> Result<ExtendedPropertyDef> {
        let mut name = None;
        let mut native_name = None;
        let mut type_id = None;
        let mut entity_type_id = None;
        for attr in el.attributes() {
            let attr = attr.map_err(xml_err)?;
            let value = attr.unescape_value().map_err(xml_err)?;
            match attr.key.as_ref() {
                b"Name" => name = Some(value.into_owned()),
                b"NativeName" => native_name = Some(value.into_owned()),
                b"Type" => type_id = Some(value.into_owned()),
                b"EntityTypeId" => {
                    entity_type_id = Some(value.parse().map_err(xml_err)?);
                }
                _ => {}
            }
        }
        let missing =
            |field: &str| StoreError::Settings(format!("ExtendedProperty missing {}", field));
        let data_type = ExtendedDataType::from_id(&type_id.ok_or_else(|| missing("Type"))?)?;
        Ok(ExtendedPropertyDef {
            entity_type_id: entity_type_id.ok_or_else(|| missing("EntityTypeId"))?,
            name: name.ok_or_else(|| missing("Name"))?,
            native_name: native_name.ok_or_else(|| missing("NativeName"))?,
            data_type,
            size: None,
            multi_value: false,
        })
    }
}

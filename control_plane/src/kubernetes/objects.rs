use getset::Getters;
use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};
use std::fmt::{Display, Formatter, Write};
use thiserror::Error;
use typed_builder::TypedBuilder;

#[derive(Error, Debug)]
pub enum ObjectRefError {
    #[error("Object is missing a name")]
    MissingName,
    #[error("Object is missing its apiVersion and kind")]
    MissingTypeMeta,
}

#[derive(TypedBuilder, Getters, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    #[getset(get = "pub")]
    #[builder(setter(into))]
    kind: String,

    #[getset(get = "pub")]
    #[builder(default, setter(into))]
    version: Option<String>,

    #[getset(get = "pub")]
    #[builder(default, setter(into))]
    group: Option<String>,

    #[getset(get = "pub")]
    #[builder(default, setter(into))]
    namespace: Option<String>,

    #[getset(get = "pub")]
    #[builder(setter(into))]
    name: String,
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())?;
        if let Some(version) = self.version() {
            f.write_char('.')?;
            f.write_str(version)?;
        }
        if let Some(group) = self.group() {
            f.write_char('.')?;
            f.write_str(group)?;
        }
        f.write_char('/')?;
        f.write_str(self.name())?;
        if let Some(namespace) = self.namespace() {
            f.write_char('.')?;
            f.write_str(namespace)?;
        }

        Ok(())
    }
}

impl ObjectRef {
    #[allow(clippy::type_complexity)] // Generated type
    pub fn of_kind<K: Resource>()
    -> ObjectRefBuilder<((String,), (Option<String>,), (Option<String>,), (), ())>
    where
        K::DynamicType: 'static + Default,
    {
        let dynamic_type = K::DynamicType::default();
        let kind = K::kind(&dynamic_type);
        let version = K::version(&dynamic_type);
        let group = K::group(&dynamic_type);

        let builder = ObjectRef::builder()
            .kind(kind)
            .version(Some(version.to_string()));

        if group.is_empty() {
            builder.group(None)
        } else {
            builder.group(Some(group.to_string()))
        }
    }

    pub fn for_object<K: Resource + ResourceExt>(object: &K) -> Result<Self, ObjectRefError>
    where
        K::DynamicType: 'static + Default,
    {
        let name = object.meta().name.clone().ok_or(ObjectRefError::MissingName)?;

        Ok(Self::of_kind::<K>()
            .namespace(object.namespace())
            .name(name)
            .build())
    }

    /// Objects created with `generateName` are named by their prefix until the
    /// API server assigns the final name.
    pub fn for_dynamic(object: &DynamicObject) -> Result<Self, ObjectRefError> {
        let types = object
            .types
            .as_ref()
            .ok_or(ObjectRefError::MissingTypeMeta)?;
        let name = object
            .metadata
            .name
            .clone()
            .or_else(|| object.metadata.generate_name.clone())
            .ok_or(ObjectRefError::MissingName)?;
        let (group, version) = match types.api_version.split_once('/') {
            Some((group, version)) => (Some(group.to_string()), version.to_string()),
            None => (None, types.api_version.clone()),
        };

        Ok(ObjectRef::builder()
            .kind(types.kind.clone())
            .version(Some(version))
            .group(group)
            .namespace(object.metadata.namespace.clone())
            .name(name)
            .build())
    }
}

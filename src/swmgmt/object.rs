//! Resource setters for a software management object instance

use crate::engine::Lwm2mEngine;
use swmgmt_shared::{resource, resource_path, SwMgmtError};

/// Set the package name of an instance
pub fn set_pkg_name(engine: &dyn Lwm2mEngine, obj_inst: u16, value: &str) -> Result<(), SwMgmtError> {
    engine.set_string(&resource_path(obj_inst, resource::PKG_NAME), value)?;
    Ok(())
}

/// Set the package version of an instance
pub fn set_pkg_version(
    engine: &dyn Lwm2mEngine,
    obj_inst: u16,
    value: &str,
) -> Result<(), SwMgmtError> {
    engine.set_string(&resource_path(obj_inst, resource::PKG_VERSION), value)?;
    Ok(())
}

/// Set the activation state of an instance
pub fn set_activate_state(
    engine: &dyn Lwm2mEngine,
    obj_inst: u16,
    active: bool,
) -> Result<(), SwMgmtError> {
    engine.set_bool(&resource_path(obj_inst, resource::ACTIVATION_STATE), active)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{LocalEngine, ResourceValue};
    use swmgmt_shared::EngineError;

    #[test]
    fn test_setters_write_resources() {
        let engine = LocalEngine::new();
        engine.create_object_instance(9, 2).unwrap();

        set_pkg_name(&engine, 2, "HL7800").unwrap();
        set_pkg_version(&engine, 2, "4.6.9.4").unwrap();
        set_activate_state(&engine, 2, true).unwrap();

        assert_eq!(engine.resource("9/2/0"), Some(ResourceValue::Str("HL7800".into())));
        assert_eq!(engine.resource("9/2/1"), Some(ResourceValue::Str("4.6.9.4".into())));
        assert_eq!(engine.resource("9/2/12"), Some(ResourceValue::Bool(true)));
    }

    #[test]
    fn test_setters_propagate_engine_errors() {
        let engine = LocalEngine::new();
        let err = set_pkg_name(&engine, 8, "x").unwrap_err();
        assert!(matches!(err, SwMgmtError::Engine(EngineError::NotFound(_))));
    }
}

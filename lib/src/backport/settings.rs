pub struct Settings {
    /// Suffix appended to an interface name to get the name of the class its static methods are
    /// moved to (eg. `$$Util` makes `a/I` into `a/I$$Util`)
    pub helper_class_suffix: String,

    /// Rewrite class names inside generic signatures
    ///
    /// This covers `Signature` attributes on classes, fields, and methods as well as the
    /// `LocalVariableTypeTable` in method bodies. Signatures are only used by reflection and
    /// debuggers, never by the verifier.
    pub rewrite_generic_signatures: bool,

    /// Rewrite type names inside annotations (annotation types, enum and class element values)
    pub rewrite_annotations: bool,
}

impl Settings {
    pub const DEFAULT_HELPER_CLASS_SUFFIX: &'static str = "$$Util";

    pub fn new() -> Settings {
        Settings {
            helper_class_suffix: String::from(Settings::DEFAULT_HELPER_CLASS_SUFFIX),
            rewrite_generic_signatures: true,
            rewrite_annotations: true,
        }
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new()
    }
}

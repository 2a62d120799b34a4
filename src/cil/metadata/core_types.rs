use super::{MetadataGraph, MethodAttributes, MethodData, MethodSignature, TypeData};

/// Types inside `System.*` that editing helpers refer to
pub struct CoreTypes<'g> {
    pub void: &'g TypeData<'g>,
    pub boolean: &'g TypeData<'g>,
    pub int32: &'g TypeData<'g>,
    pub int64: &'g TypeData<'g>,
    pub single: &'g TypeData<'g>,
    pub double: &'g TypeData<'g>,
    pub string: &'g TypeData<'g>,
    pub object: &'g TypeData<'g>,
    pub exception: &'g TypeData<'g>,

    /// `System.Object::.ctor()`
    pub object_ctor: &'g MethodData<'g>,

    /// `System.Exception::.ctor(string)`
    pub exception_ctor: &'g MethodData<'g>,
}

impl<'g> CoreTypes<'g> {
    pub fn add_to_graph(graph: &MetadataGraph<'g>) -> CoreTypes<'g> {
        let system = |name: &str, is_value_type: bool| {
            graph.add_type(TypeData::new("System", name, is_value_type))
        };

        let void = system("Void", true);
        let boolean = system("Boolean", true);
        let int32 = system("Int32", true);
        let int64 = system("Int64", true);
        let single = system("Single", true);
        let double = system("Double", true);
        let string = system("String", false);
        let object = system("Object", false);
        let exception = system("Exception", false);

        let ctor_attributes = MethodAttributes::PUBLIC
            | MethodAttributes::HIDE_BY_SIG
            | MethodAttributes::SPECIAL_NAME
            | MethodAttributes::RT_SPECIAL_NAME;
        let object_ctor = graph.add_method(MethodData::new(
            object,
            MethodData::CONSTRUCTOR,
            MethodSignature::new(true, vec![], None),
            ctor_attributes,
        ));
        let exception_ctor = graph.add_method(MethodData::new(
            exception,
            MethodData::CONSTRUCTOR,
            MethodSignature::new(true, vec![string], None),
            ctor_attributes,
        ));

        CoreTypes {
            void,
            boolean,
            int32,
            int64,
            single,
            double,
            string,
            object,
            exception,
            object_ctor,
            exception_ctor,
        }
    }
}

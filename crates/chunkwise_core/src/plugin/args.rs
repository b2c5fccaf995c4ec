use crate::ModuleId;

#[derive(Debug, Clone)]
pub struct ResolveArgs<'a> {
    pub importer: Option<&'a ModuleId>,
    pub specifier: &'a str,
}

#[derive(Debug, Clone)]
pub struct LoadArgs<'a> {
    pub id: &'a ModuleId,
}

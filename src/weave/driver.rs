use super::{Element, Error, Marker, Settings, WeavingContext};
use crate::cil::MethodBody;
use log::{debug, info, warn};

/// Program element along with the markers found on it
pub struct Target<'m, 'g> {
    pub element: Element<'g>,
    pub markers: Vec<&'m dyn Marker<'g>>,
}

impl<'m, 'g> Target<'m, 'g> {
    pub fn new(element: Element<'g>, markers: Vec<&'m dyn Marker<'g>>) -> Target<'m, 'g> {
        Target { element, markers }
    }
}

/// Member that could not be woven
#[derive(Debug)]
pub struct WeaveFailure {
    pub member: String,

    /// Always an [`Error::WhileProcessing`]
    pub error: Error,
}

/// Outcome of a weaving run
#[derive(Debug, Default)]
pub struct WeaveReport {
    /// Members woven successfully, in order
    pub woven: Vec<String>,

    /// Members rolled back, in order
    pub failures: Vec<WeaveFailure>,
}

impl WeaveReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Applies markers to program elements, one member at a time
///
/// Each member is woven as a unit: if any of its markers fails, every body touched while weaving
/// it is restored and the failure is recorded, wrapped with the member and marker it happened in.
/// Other members are unaffected, unless `stop_on_first_failure` is set, in which case the run
/// ends with that error.
pub struct Weaver<'g> {
    context: WeavingContext<'g>,
}

impl<'g> Weaver<'g> {
    pub fn new(settings: Settings) -> Weaver<'g> {
        Weaver {
            context: WeavingContext::new(settings),
        }
    }

    /// Register the body of a method that markers may rewrite
    pub fn add_body(&mut self, body: MethodBody<'g>) -> &mut Self {
        self.context.add_body(body);
        self
    }

    pub fn context(&self) -> &WeavingContext<'g> {
        &self.context
    }

    pub fn into_context(self) -> WeavingContext<'g> {
        self.context
    }

    /// Weave every target, in order
    pub fn run<'m, I>(&mut self, targets: I) -> Result<WeaveReport, Error>
    where
        I: IntoIterator<Item = Target<'m, 'g>>,
        'g: 'm,
    {
        let mut report = WeaveReport::default();
        for target in targets {
            let member = target.element.member_name();
            match self.weave_member(&target) {
                Ok(()) => {
                    debug!("wove {}", member);
                    report.woven.push(member);
                }
                Err(error) => {
                    warn!("{}", error);
                    if self.context.settings().stop_on_first_failure {
                        return Err(error);
                    }
                    report.failures.push(WeaveFailure { member, error });
                }
            }
        }
        info!(
            "weaving done: {} members woven, {} failed",
            report.woven.len(),
            report.failures.len()
        );
        Ok(report)
    }

    fn weave_member(&mut self, target: &Target<'_, 'g>) -> Result<(), Error> {
        let kind = target.element.kind();
        self.context.begin_member();
        for marker in &target.markers {
            let result = if marker.can_weave(kind) {
                marker.weave(&target.element, &mut self.context)
            } else {
                Err(Error::NotApplicable {
                    marker: marker.name().to_owned(),
                    kind,
                })
            };
            if let Err(error) = result {
                self.context.rollback_member();
                return Err(Error::WhileProcessing {
                    member: target.element.member_name(),
                    marker: marker.name().to_owned(),
                    source: Box::new(error),
                });
            }
        }
        if let Err(error) = self.context.commit_member() {
            self.context.rollback_member();
            let marker = target
                .markers
                .last()
                .map_or_else(String::new, |marker| marker.name().to_owned());
            return Err(Error::WhileProcessing {
                member: target.element.member_name(),
                marker,
                source: Box::new(error),
            });
        }
        Ok(())
    }
}

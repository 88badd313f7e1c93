/// A named bundle of resources, selected with `-j/--job-template`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTemplate {
    /// The template name.
    pub name: &'static str,
    /// Cpus per task.
    pub cpu: u32,
    /// Memory, in megabytes.
    pub mem: u32,
    /// Time limit, in minutes.
    pub time: u32,
}

const fn template(name: &'static str, cpu: u32, mem: u32, time: u32) -> JobTemplate {
    JobTemplate {
        name,
        cpu,
        mem,
        time,
    }
}

const HOUR: u32 = 60;
const DAY: u32 = 24 * HOUR;

/// The job templates, in display order.
pub const TEMPLATES: [JobTemplate; 6] = [
    template("Inter", 8, 32000, 3 * HOUR),
    template("Regular", 32, 128000, DAY),
    template("Fat", 32, 256000, DAY),
    template("ThreeDay", 32, 128000, 3 * DAY),
    template("LongSkinny", 8, 32000, 7 * DAY),
    template("Short", 4, 16000, HOUR),
];

/// The template called `name`.
pub fn find_template(name: &str) -> Option<&'static JobTemplate> {
    TEMPLATES.iter().find(|template| template.name == name)
}

/// The template names, comma separated.
pub fn template_names() -> String {
    TEMPLATES
        .iter()
        .map(|template| template.name)
        .collect::<Vec<&str>>()
        .join(", ")
}

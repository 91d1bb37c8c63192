//! Config files written to the target host.
//!
//! Templates live as standalone files under `templates/` and are compiled
//! into the crate, so they can be edited and diffed as the files they produce.

use minijinja::Environment;
use serde::Serialize;

use crate::error::Result;

pub const SUPERVISOR_GUNICORN: &str = "supervisor_gunicorn.conf";
pub const SUPERVISOR_TORNADO: &str = "supervisor_tornado.conf";
pub const NGINX_DJANGO: &str = "nginx_django.conf";
pub const NGINX_UPSTREAM: &str = "nginx_upstream.conf";
pub const APACHE_DJANGO: &str = "apache_django.conf";
pub const WSGI_HANDLER: &str = "wsgi_handler.py";

const TEMPLATES: [(&str, &str); 6] = [
    (SUPERVISOR_GUNICORN, include_str!("../templates/supervisor_gunicorn.conf")),
    (SUPERVISOR_TORNADO, include_str!("../templates/supervisor_tornado.conf")),
    (NGINX_DJANGO, include_str!("../templates/nginx_django.conf")),
    (NGINX_UPSTREAM, include_str!("../templates/nginx_upstream.conf")),
    (APACHE_DJANGO, include_str!("../templates/apache_django.conf")),
    (WSGI_HANDLER, include_str!("../templates/wsgi_handler.py")),
];

pub fn render<T: Serialize>(name: &str, context: &T) -> Result<String> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    for (template_name, source) in TEMPLATES {
        env.add_template(template_name, source)?;
    }
    Ok(env.get_template(name)?.render(context)?)
}

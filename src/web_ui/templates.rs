//! Template engine setup and HTML templates.

use once_cell::sync::Lazy;
use tera::{Context, Tera};

use crate::i18n;

/// Global template engine instance with embedded templates.
pub static TEMPLATES: Lazy<Tera> = Lazy::new(|| {
    let mut tera = Tera::default();

    // Embed templates directly in the binary (no external files needed)
    tera.add_raw_templates(vec![
        ("base.html", BASE_TEMPLATE),
        ("pagination.html", PAGINATION_TEMPLATE),
        ("settings_nav.html", SETTINGS_NAV_TEMPLATE),
        ("error.html", ERROR_TEMPLATE),
        ("login.html", LOGIN_TEMPLATE),
        ("user/settings/profile.html", PROFILE_TEMPLATE),
        ("user/settings/organization.html", ORGANIZATION_TEMPLATE),
        ("user/settings/repos.html", REPOS_TEMPLATE),
        ("user/settings/appearance.html", APPEARANCE_TEMPLATE),
    ])
    .expect("Failed to load templates");
    tera.register_function("tr", i18n::tera_tr);

    tera
});

/// Render a template with context
pub fn render(template: &str, context: &Context) -> Result<String, tera::Error> {
    TEMPLATES.render(template, context)
}

// =============================================================================
// Embedded Templates - Dark Mode Design
// =============================================================================

const BASE_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="{{ lang }}">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{% block title %}{{ title | default(value="gitforge") }} - gitforge{% endblock %}</title>
    <style>
        :root {
            --bg: #0a0a0a;
            --bg-secondary: #141414;
            --foreground: #fafafa;
            --foreground-secondary: rgba(250, 250, 250, 0.7);
            --foreground-tertiary: rgba(250, 250, 250, 0.4);
            --border: #262626;
            --border-subtle: #1a1a1a;
        }

        * { box-sizing: border-box; margin: 0; padding: 0; }

        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Helvetica, Arial, sans-serif;
            background: var(--bg);
            color: var(--foreground);
            line-height: 1.6;
            -webkit-font-smoothing: antialiased;
        }

        a { color: var(--foreground); text-decoration: none; transition: opacity 0.15s; }
        a:hover { opacity: 0.7; }

        /* Header */
        .header { border-bottom: 1px solid var(--border-subtle); padding: 20px 32px; }
        .header-content {
            max-width: 1200px;
            margin: 0 auto;
            display: flex;
            align-items: center;
            justify-content: space-between;
        }
        .logo { font-size: 18px; font-weight: 600; letter-spacing: -0.02em; }
        .nav { display: flex; gap: 32px; }
        .nav a { color: var(--foreground-secondary); font-size: 14px; }
        .nav a:hover { color: var(--foreground); opacity: 1; }

        /* Layout */
        .container { max-width: 1200px; margin: 0 auto; padding: 48px 32px; }
        .settings { display: flex; gap: 32px; align-items: flex-start; }
        .settings-nav { min-width: 200px; }
        .settings-nav a {
            display: block;
            padding: 8px 12px;
            border-radius: 8px;
            color: var(--foreground-secondary);
            font-size: 14px;
        }
        .settings-nav a.active { background: var(--bg-secondary); color: var(--foreground); }
        .settings-body { flex: 1; }

        h1 { font-size: 32px; font-weight: 600; letter-spacing: -0.02em; margin-bottom: 32px; }
        h2 {
            font-size: 14px;
            font-weight: 500;
            color: var(--foreground-secondary);
            text-transform: uppercase;
            letter-spacing: 0.05em;
            margin-bottom: 16px;
        }

        /* Cards */
        .card { background: var(--bg-secondary); border: 1px solid var(--border); border-radius: 16px; overflow: hidden; }
        .card + .card { margin-top: 24px; }
        .card-body { padding: 24px; }

        /* Lists */
        .list { list-style: none; }
        .list-item {
            padding: 16px 20px;
            border-bottom: 1px solid var(--border-subtle);
            display: flex;
            align-items: center;
            gap: 16px;
        }
        .list-item:last-child { border-bottom: none; }
        .list-item .grow { flex: 1; }

        /* Forms */
        .field { margin-bottom: 16px; }
        .field label { display: block; font-size: 13px; color: var(--foreground-secondary); margin-bottom: 6px; }
        .field input[type=text], .field input[type=email], .field input[type=password], .field textarea, .field select {
            width: 100%;
            background: var(--bg);
            color: var(--foreground);
            border: 1px solid var(--border);
            border-radius: 8px;
            padding: 8px 12px;
            font-size: 14px;
        }
        .checkbox { display: flex; gap: 8px; align-items: center; font-size: 14px; margin-bottom: 8px; }
        .avatar { width: 64px; height: 64px; border-radius: 8px; }
        .avatar-sm { width: 24px; height: 24px; border-radius: 4px; }

        /* Badges */
        .badge {
            font-size: 11px;
            font-weight: 500;
            padding: 4px 10px;
            border-radius: 100px;
            background: var(--border);
            color: var(--foreground-secondary);
            text-transform: uppercase;
            letter-spacing: 0.02em;
        }
        .badge-warning { background: rgba(234, 179, 8, 0.15); color: #facc15; }
        .badge-info { background: rgba(59, 130, 246, 0.15); color: #60a5fa; }

        /* Flash */
        .flash { padding: 12px 16px; border-radius: 8px; margin-bottom: 24px; font-size: 14px; }
        .flash-success { background: rgba(34, 197, 94, 0.15); color: #4ade80; }
        .flash-error { background: rgba(239, 68, 68, 0.15); color: #f87171; }
        .errors { list-style: none; margin-bottom: 16px; }

        /* Buttons */
        .btn {
            display: inline-flex;
            align-items: center;
            gap: 8px;
            padding: 10px 20px;
            border-radius: 100px;
            font-size: 14px;
            font-weight: 500;
            border: none;
            cursor: pointer;
        }
        .btn-primary { background: var(--foreground); color: var(--bg); }
        .btn-secondary { background: transparent; border: 1px solid var(--border); color: var(--foreground); }
        .btn-danger { background: transparent; border: 1px solid #f87171; color: #f87171; }

        /* Pagination */
        .pagination { display: flex; gap: 8px; margin-top: 24px; font-size: 14px; }
        .pagination a, .pagination span { padding: 4px 10px; border-radius: 6px; border: 1px solid var(--border); }
        .pagination .current { background: var(--foreground); color: var(--bg); }

        /* Empty state */
        .empty { text-align: center; padding: 64px 32px; color: var(--foreground-tertiary); }

        .text-secondary { color: var(--foreground-secondary); }
        .text-tertiary { color: var(--foreground-tertiary); }
        .text-sm { font-size: 13px; }
        .mt-4 { margin-top: 16px; }
        .mt-6 { margin-top: 24px; }

        @media (max-width: 768px) {
            .header { padding: 16px 20px; }
            .container { padding: 32px 20px; }
            .settings { flex-direction: column; }
            h1 { font-size: 24px; }
            .nav { gap: 20px; }
        }
    </style>
</head>
<body>
    <header class="header">
        <div class="header-content">
            <a href="{{ app_sub_url }}/" class="logo">gitforge</a>
            <nav class="nav">
                {% if current_user %}
                <a href="{{ app_sub_url }}/user/settings">{{ current_user }}</a>
                <a href="{{ app_sub_url }}/user/logout">{{ tr(key="auth.sign_out", lang=lang) }}</a>
                {% else %}
                <a href="{{ app_sub_url }}/user/login">{{ tr(key="auth.sign_in", lang=lang) }}</a>
                {% endif %}
            </nav>
        </div>
    </header>
    <main class="container">
        {% if flash %}
        <div class="flash flash-{{ flash.kind }}">{{ flash.message }}</div>
        {% endif %}
        {% block content %}{% endblock %}
    </main>
</body>
</html>"##;

const PAGINATION_TEMPLATE: &str = r##"{% if page.total_pages > 1 %}
<nav class="pagination">
    {% if page.previous %}<a href="?page={{ page.previous }}">&laquo;</a>{% endif %}
    {% for p in page.pages %}
    {% if p == page.current %}<span class="current">{{ p }}</span>{% else %}<a href="?page={{ p }}">{{ p }}</a>{% endif %}
    {% endfor %}
    {% if page.next %}<a href="?page={{ page.next }}">&raquo;</a>{% endif %}
</nav>
{% endif %}"##;

const SETTINGS_NAV_TEMPLATE: &str = r##"<nav class="settings-nav">
    <a href="{{ app_sub_url }}/user/settings"{% if page_is_settings_profile %} class="active"{% endif %}>{{ tr(key="settings.profile", lang=lang) }}</a>
    <a href="{{ app_sub_url }}/user/settings/appearance"{% if page_is_settings_appearance %} class="active"{% endif %}>{{ tr(key="settings.appearance", lang=lang) }}</a>
    <a href="{{ app_sub_url }}/user/settings/organization"{% if page_is_settings_organization %} class="active"{% endif %}>{{ tr(key="settings.organization", lang=lang) }}</a>
    <a href="{{ app_sub_url }}/user/settings/repos"{% if page_is_settings_repos %} class="active"{% endif %}>{{ tr(key="settings.repos", lang=lang) }}</a>
</nav>"##;

const ERROR_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block title %}{{ status }} - gitforge{% endblock %}
{% block content %}
<div class="card">
    <div style="padding: 48px; text-align: center;">
        <h1 style="margin-bottom: 16px;">{{ status }}</h1>
        <p class="text-secondary">{{ message }}</p>
        <a href="{{ app_sub_url }}/" class="btn btn-secondary mt-6">Return home</a>
    </div>
</div>
{% endblock %}"##;

const LOGIN_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block content %}
<div class="card" style="max-width: 420px; margin: 0 auto;">
    <div class="card-body">
        <h1>{{ tr(key="auth.sign_in", lang=lang) }}</h1>
        {% if error %}<div class="flash flash-error">{{ error }}</div>{% endif %}
        <form method="post" action="{{ app_sub_url }}/user/login">
            <div class="field">
                <label for="username">{{ tr(key="auth.username", lang=lang) }}</label>
                <input type="text" id="username" name="username" value="{{ username }}" autofocus required>
            </div>
            <div class="field">
                <label for="password">{{ tr(key="auth.password", lang=lang) }}</label>
                <input type="password" id="password" name="password" required>
            </div>
            <button class="btn btn-primary">{{ tr(key="auth.sign_in", lang=lang) }}</button>
        </form>
    </div>
</div>
{% endblock %}"##;

const PROFILE_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block content %}
<div class="settings">
    {% include "settings_nav.html" %}
    <div class="settings-body">
        <div class="card">
            <div class="card-body">
                <h2>{{ tr(key="settings.public_profile", lang=lang) }}</h2>
                {% if errors %}
                <ul class="errors">
                    {% for error in errors %}<li class="flash flash-error">{{ error }}</li>{% endfor %}
                </ul>
                {% endif %}
                <form method="post" action="{{ app_sub_url }}/user/settings">
                    <input type="hidden" name="_csrf" value="{{ csrf_token }}">
                    <div class="field">
                        <label for="name">{{ tr(key="auth.username", lang=lang) }}</label>
                        <input type="text" id="name" name="name" value="{{ profile.name }}"{% if not profile.is_local %} disabled{% endif %}>
                        <p class="text-tertiary text-sm">{{ tr(key="settings.change_username_prompt", lang=lang) }}</p>
                    </div>
                    <div class="field">
                        <label for="full_name">{{ tr(key="settings.full_name", lang=lang) }}</label>
                        <input type="text" id="full_name" name="full_name" value="{{ profile.full_name }}">
                    </div>
                    <div class="field">
                        <label for="email">Email</label>
                        <input type="email" id="email" name="email" value="{{ profile.email }}">
                    </div>
                    <label class="checkbox"><input type="checkbox" name="keep_email_private"{% if profile.keep_email_private %} checked{% endif %}> {{ tr(key="settings.keep_email_private", lang=lang) }}</label>
                    <div class="field">
                        <label for="description">{{ tr(key="settings.biography", lang=lang) }}</label>
                        <textarea id="description" name="description" rows="2">{{ profile.description }}</textarea>
                    </div>
                    <div class="field">
                        <label for="website">{{ tr(key="settings.website", lang=lang) }}</label>
                        <input type="text" id="website" name="website" value="{{ profile.website }}">
                    </div>
                    <div class="field">
                        <label for="location">{{ tr(key="settings.location", lang=lang) }}</label>
                        <input type="text" id="location" name="location" value="{{ profile.location }}">
                    </div>
                    <h2 class="mt-6">{{ tr(key="settings.privacy", lang=lang) }}</h2>
                    <div class="field">
                        <label for="visibility">{{ tr(key="settings.visibility", lang=lang) }}</label>
                        <select id="visibility" name="visibility">
                            {% for mode in allowed_visibility_modes %}
                            <option value="{{ mode }}"{% if mode == profile.visibility %} selected{% endif %}>{{ tr(key="settings.visibility." ~ mode, lang=lang) }} ({{ mode }})</option>
                            {% endfor %}
                        </select>
                    </div>
                    <label class="checkbox"><input type="checkbox" name="keep_activity_private"{% if profile.keep_activity_private %} checked{% endif %}> {{ tr(key="settings.keep_activity_private", lang=lang) }}</label>
                    <button class="btn btn-primary mt-4">{{ tr(key="settings.update_profile", lang=lang) }}</button>
                </form>
            </div>
        </div>

        <div class="card">
            <div class="card-body">
                <h2>{{ tr(key="settings.avatar", lang=lang) }}</h2>
                <img class="avatar" src="{{ profile.avatar_link }}" alt="">
                <form method="post" action="{{ app_sub_url }}/user/settings/avatar" enctype="multipart/form-data" class="mt-4">
                    <input type="hidden" name="_csrf" value="{{ csrf_token }}">
                    <label class="checkbox"><input type="radio" name="source" value="lookup"{% if not profile.use_custom_avatar %} checked{% endif %}> Email</label>
                    <div class="field">
                        <input type="email" name="gravatar" value="{{ profile.avatar_email }}">
                    </div>
                    <label class="checkbox"><input type="radio" name="source" value="local"{% if profile.use_custom_avatar %} checked{% endif %}> {{ tr(key="settings.use_custom_avatar", lang=lang) }}</label>
                    <div class="field">
                        <label for="avatar">{{ tr(key="settings.choose_new_avatar", lang=lang) }} (&le; {{ max_avatar_file_size | filesizeformat }})</label>
                        <input type="file" id="avatar" name="avatar" accept="image/png,image/jpeg,image/gif,image/webp">
                    </div>
                    <button class="btn btn-primary">{{ tr(key="settings.update_avatar", lang=lang) }}</button>
                </form>
                <form method="post" action="{{ app_sub_url }}/user/settings/avatar/delete" class="mt-4">
                    <input type="hidden" name="_csrf" value="{{ csrf_token }}">
                    <button class="btn btn-danger">{{ tr(key="settings.delete_current_avatar", lang=lang) }}</button>
                </form>
            </div>
        </div>
    </div>
</div>
{% endblock %}"##;

const ORGANIZATION_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block content %}
<div class="settings">
    {% include "settings_nav.html" %}
    <div class="settings-body">
        <h2>{{ tr(key="settings.organization", lang=lang) }}</h2>
        <div class="card">
            {% if orgs | length > 0 %}
            <ul class="list">
                {% for org in orgs %}
                <li class="list-item">
                    <img class="avatar-sm" src="{{ org.avatar_link }}" alt="">
                    <a class="grow" href="{{ app_sub_url }}/{{ org.name }}">{{ org.name }}</a>
                    {% if org.full_name %}<span class="text-secondary text-sm">{{ org.full_name }}</span>{% endif %}
                    {% if org.visibility != "public" %}<span class="badge badge-warning">{{ tr(key="settings.visibility." ~ org.visibility, lang=lang) }}</span>{% endif %}
                </li>
                {% endfor %}
            </ul>
            {% else %}
            <div class="empty"><p>{{ tr(key="settings.orgs_none", lang=lang) }}</p></div>
            {% endif %}
        </div>
        {% include "pagination.html" %}
    </div>
</div>
{% endblock %}"##;

const REPOS_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block content %}
<div class="settings">
    {% include "settings_nav.html" %}
    <div class="settings-body">
        <h2>{{ tr(key="settings.repos", lang=lang) }}</h2>
        <div class="card">
            {% if adopt_or_delete %}
            {% if dirs | length > 0 %}
            <ul class="list">
                {% for dir in dirs %}
                <li class="list-item">
                    {% if dir in repos_map %}
                    {% set repo = repos_map[dir] %}
                    <a class="grow" href="{{ app_sub_url }}/{{ owner }}/{{ repo.name }}">{{ owner }}/{{ repo.name }}</a>
                    {% if repo.is_private %}<span class="badge badge-warning">{{ tr(key="repo.private", lang=lang) }}</span>{% endif %}
                    {% if repo.base_full_name %}<span class="text-tertiary text-sm">{{ tr(key="repo.fork", lang=lang) }} {{ repo.base_full_name }}</span>{% endif %}
                    <span class="text-tertiary text-sm">{{ repo.updated }}</span>
                    {% else %}
                    <span class="grow">{{ owner }}/{{ dir }}</span>
                    <span class="badge badge-info">{{ tr(key="settings.unadopted", lang=lang) }}</span>
                    {% if allow_adopt %}<button class="btn btn-secondary" disabled>{{ tr(key="settings.adopt", lang=lang) }}</button>{% endif %}
                    {% if allow_delete %}<button class="btn btn-danger" disabled>{{ tr(key="settings.delete", lang=lang) }}</button>{% endif %}
                    {% endif %}
                </li>
                {% endfor %}
            </ul>
            {% else %}
            <div class="empty"><p>{{ tr(key="settings.repos_none", lang=lang) }}</p></div>
            {% endif %}
            {% else %}
            {% if repos | length > 0 %}
            <ul class="list">
                {% for repo in repos %}
                <li class="list-item">
                    <a class="grow" href="{{ app_sub_url }}/{{ owner }}/{{ repo.name }}">{{ owner }}/{{ repo.name }}</a>
                    {% if repo.is_private %}<span class="badge badge-warning">{{ tr(key="repo.private", lang=lang) }}</span>{% endif %}
                    {% if repo.base_full_name %}<span class="text-tertiary text-sm">{{ tr(key="repo.fork", lang=lang) }} {{ repo.base_full_name }}</span>{% endif %}
                    <span class="text-tertiary text-sm">{{ repo.updated }}</span>
                </li>
                {% endfor %}
            </ul>
            {% else %}
            <div class="empty"><p>{{ tr(key="settings.repos_none", lang=lang) }}</p></div>
            {% endif %}
            {% endif %}
        </div>
        {% include "pagination.html" %}
    </div>
</div>
{% endblock %}"##;

const APPEARANCE_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block content %}
<div class="settings">
    {% include "settings_nav.html" %}
    <div class="settings-body">
        <div class="card">
            <div class="card-body">
                <h2>{{ tr(key="settings.manage_themes", lang=lang) }}</h2>
                <form method="post" action="{{ app_sub_url }}/user/settings/appearance/theme">
                    <input type="hidden" name="_csrf" value="{{ csrf_token }}">
                    <div class="field">
                        <select name="theme">
                            {% for theme in themes %}
                            <option value="{{ theme }}"{% if theme == current_theme %} selected{% endif %}>{{ theme }}</option>
                            {% endfor %}
                        </select>
                    </div>
                    <button class="btn btn-primary">{{ tr(key="settings.update_theme", lang=lang) }}</button>
                </form>
            </div>
        </div>

        <div class="card">
            <div class="card-body">
                <h2>{{ tr(key="settings.language", lang=lang) }}</h2>
                <form method="post" action="{{ app_sub_url }}/user/settings/appearance/language">
                    <input type="hidden" name="_csrf" value="{{ csrf_token }}">
                    <div class="field">
                        <select name="language">
                            {% for language in languages %}
                            <option value="{{ language.code }}"{% if language.code == current_language %} selected{% endif %}>{{ language.name }}</option>
                            {% endfor %}
                        </select>
                    </div>
                    <button class="btn btn-primary">{{ tr(key="settings.update_language", lang=lang) }}</button>
                </form>
            </div>
        </div>

        <div class="card">
            <div class="card-body">
                <h2>{{ tr(key="settings.hidden_comment_types", lang=lang) }}</h2>
                <p class="text-secondary text-sm">{{ tr(key="settings.hidden_comment_types_description", lang=lang) }}</p>
                <form method="post" action="{{ app_sub_url }}/user/settings/appearance/hidden_comments" class="mt-4">
                    <input type="hidden" name="_csrf" value="{{ csrf_token }}">
                    {% for group in comment_groups %}
                    <label class="checkbox"><input type="checkbox" name="{{ group.name }}"{% if group.checked %} checked{% endif %}> {{ group.label }}</label>
                    {% endfor %}
                    <button class="btn btn-primary mt-4">{{ tr(key="settings.save_application", lang=lang) }}</button>
                </form>
            </div>
        </div>
    </div>
</div>
{% endblock %}"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web_ui::routes::utils::Pagination;

    #[test]
    fn test_all_templates_parse() {
        assert!(TEMPLATES.get_template_names().count() >= 9);
    }

    #[test]
    fn test_error_page_renders_without_user() {
        let mut context = Context::new();
        context.insert("message", "gone");
        context.insert("status", &404);
        context.insert("lang", "de-DE");
        context.insert("app_sub_url", "/git");
        let html = render("error.html", &context).unwrap();
        assert!(html.contains("gone"));
        assert!(html.contains("Anmelden"));
    }

    #[test]
    fn test_pagination_links() {
        let mut context = Context::new();
        context.insert("page", &Pagination::new(120, 50, 2, 5));
        let html = render("pagination.html", &context).unwrap();
        assert!(html.contains("<span class=\"current\">2</span>"));
        assert!(html.contains("?page=3"));
        assert!(html.contains("?page=1"));
    }
}

use actix_web::{http::header::ContentType, HttpResponse};

/// A minimal page that sends the customer's browser on to the payment page.
pub fn redirect_page(target: &str) -> String {
    // A JSON string is also a valid JS string literal; escape `<` so the URL cannot close the script tag.
    let target_js = serde_json::to_string(target).unwrap_or_else(|_| "\"/\"".into()).replace('<', "\\u003c");
    format!(
        r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>正在跳转...</title>
    <style>
        body {{ font-family: sans-serif; display: flex; flex-direction: column; align-items: center; justify-content: center; height: 100vh; margin: 0; }}
        .spinner {{ width: 40px; height: 40px; border: 4px solid #eee; border-top-color: #1677ff; border-radius: 50%; animation: spin 1s linear infinite; }}
        @keyframes spin {{ to {{ transform: rotate(360deg); }} }}
    </style>
</head>
<body>
    <div class="spinner"></div>
    <p>正在跳转到支付页面，请稍候...</p>
    <script>window.location.href = {target_js};</script>
</body>
</html>
"#
    )
}

pub fn html_redirect_response(target: &str) -> HttpResponse {
    HttpResponse::Ok().insert_header(ContentType::html()).body(redirect_page(target))
}
